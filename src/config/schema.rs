use serde::Deserialize;
use std::path::PathBuf;

/// The TOML file structure for toolbelt.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub limits: Option<LimitsConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub workspace: Option<String>,
    /// Directory for session JSONL logs.
    pub log_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitsConfig {
    /// Default `bash` timeout in milliseconds.
    pub default_timeout_ms: Option<u64>,
    pub max_output_chars: Option<usize>,
    /// Default number of lines returned by `read_file`.
    pub read_limit: Option<usize>,
    pub max_line_chars: Option<usize>,
}

impl ConfigFile {
    pub fn to_partial(&self) -> PartialConfig {
        let general = self.general.as_ref();
        let limits = self.limits.as_ref();
        PartialConfig {
            workspace: general.and_then(|g| g.workspace.as_ref()).map(PathBuf::from),
            log_dir: general.and_then(|g| g.log_dir.as_ref()).map(PathBuf::from),
            default_timeout_ms: limits.and_then(|l| l.default_timeout_ms),
            max_output_chars: limits.and_then(|l| l.max_output_chars),
            read_limit: limits.and_then(|l| l.read_limit),
            max_line_chars: limits.and_then(|l| l.max_line_chars),
        }
    }
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub workspace: PathBuf,
    pub default_timeout_ms: u64,
    pub max_output_chars: usize,
    pub read_limit: usize,
    pub max_line_chars: usize,
    pub log_dir: PathBuf,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub workspace: Option<PathBuf>,
    pub default_timeout_ms: Option<u64>,
    pub max_output_chars: Option<usize>,
    pub read_limit: Option<usize>,
    pub max_line_chars: Option<usize>,
    pub log_dir: Option<PathBuf>,
}
