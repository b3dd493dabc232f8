use super::schema::{AppConfig, PartialConfig};
use std::path::PathBuf;

pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 30_000;
pub const DEFAULT_READ_LIMIT: usize = 2_000;
pub const DEFAULT_MAX_LINE_CHARS: usize = 2_000;

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            workspace: self.workspace.or(fallback.workspace),
            default_timeout_ms: self.default_timeout_ms.or(fallback.default_timeout_ms),
            max_output_chars: self.max_output_chars.or(fallback.max_output_chars),
            read_limit: self.read_limit.or(fallback.read_limit),
            max_line_chars: self.max_line_chars.or(fallback.max_line_chars),
            log_dir: self.log_dir.or(fallback.log_dir),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    ///
    /// Without a configured log directory, logs go to the platform data
    /// directory, or `.toolbelt-logs` in the workspace when there is none.
    pub fn finalize(self) -> AppConfig {
        let workspace = self.workspace.unwrap_or_else(|| PathBuf::from("."));
        let log_dir = self
            .log_dir
            .or_else(default_log_dir)
            .unwrap_or_else(|| workspace.join(".toolbelt-logs"));

        AppConfig {
            workspace,
            default_timeout_ms: self.default_timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            max_output_chars: self.max_output_chars.unwrap_or(DEFAULT_MAX_OUTPUT_CHARS),
            read_limit: self.read_limit.unwrap_or(DEFAULT_READ_LIMIT),
            max_line_chars: self.max_line_chars.unwrap_or(DEFAULT_MAX_LINE_CHARS),
            log_dir,
        }
    }
}

fn default_log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "toolbelt").map(|dirs| dirs.data_local_dir().join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_wins() {
        let cli = PartialConfig {
            default_timeout_ms: Some(5_000),
            ..Default::default()
        };
        let file = PartialConfig {
            default_timeout_ms: Some(60_000),
            read_limit: Some(100),
            ..Default::default()
        };

        let merged = cli.with_fallback(file).finalize();
        assert_eq!(merged.default_timeout_ms, 5_000);
        assert_eq!(merged.read_limit, 100);
        assert_eq!(merged.max_output_chars, DEFAULT_MAX_OUTPUT_CHARS);
    }

    #[test]
    fn defaults_fill_gaps() {
        let config = PartialConfig::default().finalize();
        assert_eq!(config.workspace, PathBuf::from("."));
        assert_eq!(config.default_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.read_limit, DEFAULT_READ_LIMIT);
        assert_eq!(config.max_line_chars, DEFAULT_MAX_LINE_CHARS);
    }

    #[test]
    fn explicit_log_dir_is_kept() {
        let config = PartialConfig {
            log_dir: Some(PathBuf::from("/var/log/toolbelt")),
            ..Default::default()
        }
        .finalize();
        assert_eq!(config.log_dir, PathBuf::from("/var/log/toolbelt"));
    }
}
