use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use toolbelt::cli::{Cli, Commands};
use toolbelt::config;
use toolbelt::logging::SessionLogger;
use toolbelt::orchestration::UnconfiguredRunner;
use toolbelt::session::{EventBus, SessionState};
use toolbelt::tools::{ToolDispatcher, define_tools};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tool results go to stdout; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Tools => {
            println!("{}", serde_json::to_string_pretty(&define_tools())?);
        }
        Commands::Invoke {
            tool, args, no_log, ..
        } => {
            let config = config::load_config(&cli)?;
            tracing::info!(workspace = %config.workspace.display(), "Config loaded");

            let args: serde_json::Value =
                serde_json::from_str(args).context("tool arguments must be a JSON value")?;

            let bus = EventBus::default();
            let logger = if *no_log {
                None
            } else {
                match SessionLogger::new(&config.log_dir) {
                    Ok(logger) => {
                        let logger = Arc::new(logger);
                        if let Err(e) = logger.log_session_start(&config.workspace) {
                            tracing::warn!("Failed to write session log: {e:#}");
                        }
                        tracing::info!(path = %logger.log_path().display(), "Session log opened");
                        bus.add_observer(logger.clone());
                        Some(logger)
                    }
                    Err(e) => {
                        tracing::warn!("Session logging disabled: {e:#}");
                        None
                    }
                }
            };

            let session = SessionState::new(Arc::new(bus));
            let dispatcher = ToolDispatcher::new(config, session, Arc::new(UnconfiguredRunner));

            let result = dispatcher.invoke(tool, args).await;

            // A one-shot session does not outlive its background shells.
            dispatcher.shells().shutdown().await;
            if let Some(logger) = &logger {
                if let Err(e) = logger.log_session_end("completed") {
                    tracing::warn!("Failed to write session log: {e:#}");
                }
            }

            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.is_success() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
