use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "toolbelt", version, about = "Tool execution core for coding agents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the JSON schema of every tool
    Tools,
    /// Run one tool call against a fresh session and print the result
    Invoke {
        /// Tool name (e.g., "read_file", "bash")
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,

        /// Workspace directory path
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Default bash timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Path to config file (overrides the workspace config)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Do not write a session log
        #[arg(long)]
        no_log: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_invoke() {
        let cli = Cli::try_parse_from([
            "toolbelt",
            "invoke",
            "bash",
            r#"{"command":"ls"}"#,
            "--workspace",
            "/tmp/ws",
            "--no-log",
        ])
        .unwrap();

        match cli.command {
            Commands::Invoke {
                tool,
                args,
                workspace,
                no_log,
                ..
            } => {
                assert_eq!(tool, "bash");
                assert_eq!(args, r#"{"command":"ls"}"#);
                assert_eq!(workspace, Some(PathBuf::from("/tmp/ws")));
                assert!(no_log);
            }
            Commands::Tools => panic!("expected invoke"),
        }
    }

    #[test]
    fn args_default_to_empty_object() {
        let cli = Cli::try_parse_from(["toolbelt", "invoke", "wait_subagents"]).unwrap();
        assert!(matches!(cli.command, Commands::Invoke { ref args, .. } if args == "{}"));
    }
}
