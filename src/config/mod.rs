pub mod merge;
pub mod schema;

pub use schema::*;

use crate::cli::{Cli, Commands};
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "toolbelt.toml";

/// Load configuration by merging global, workspace, and CLI sources.
/// Precedence: CLI > workspace config (or `--config` file) > global config > defaults.
///
/// Missing config files are handled gracefully (defaults apply). A config
/// file that exists but cannot be parsed is an error.
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/toolbelt/toolbelt.toml or platform equivalent)
    let global = match global_config_path() {
        Some(path) => load_toml_file(&path)?.unwrap_or_default(),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    };

    // Determine workspace path from CLI or global config, for loading workspace config.
    let workspace_path = cli_workspace(cli)
        .or_else(|| global.workspace.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    // Layer 2: explicit --config file, else workspace/toolbelt.toml
    let middle = match cli_config_path(cli) {
        Some(path) => load_toml_file(&path)?.ok_or_else(|| {
            ConfigError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file not found: {}", path.display()),
            ))
        })?,
        None => load_toml_file(&workspace_path.join(CONFIG_FILE_NAME))?.unwrap_or_default(),
    };

    // Layer 3: CLI args (converted to PartialConfig)
    let cli_partial = cli_to_partial(cli);

    let config = cli_partial
        .with_fallback(middle)
        .with_fallback(global)
        .finalize();

    Ok(config)
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns `Ok(None)` when the file does not exist.
pub fn load_toml_file(path: &Path) -> Result<Option<PartialConfig>, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let config_file: ConfigFile =
        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(Some(config_file.to_partial()))
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/toolbelt/toolbelt.toml
/// macOS: ~/Library/Application Support/toolbelt/toolbelt.toml
fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "toolbelt")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

fn cli_workspace(cli: &Cli) -> Option<PathBuf> {
    match &cli.command {
        Commands::Invoke { workspace, .. } => workspace.clone(),
        Commands::Tools => None,
    }
}

fn cli_config_path(cli: &Cli) -> Option<PathBuf> {
    match &cli.command {
        Commands::Invoke { config, .. } => config.clone(),
        Commands::Tools => None,
    }
}

/// Convert CLI arguments to a PartialConfig for merging.
fn cli_to_partial(cli: &Cli) -> PartialConfig {
    match &cli.command {
        Commands::Invoke {
            workspace, timeout, ..
        } => PartialConfig {
            workspace: workspace.clone(),
            default_timeout_ms: *timeout,
            ..Default::default()
        },
        Commands::Tools => PartialConfig::default(),
    }
}
