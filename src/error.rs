use std::path::PathBuf;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

/// Failure taxonomy shared by every tool.
///
/// All variants are converted into a failed [`crate::session::ToolResult`] at
/// the dispatcher boundary; none of them ever reaches the model loop as an
/// unhandled fault.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// A file, shell id, or task id does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Malformed arguments, a no-op or ambiguous edit, an invalid regex.
    #[error("{0}")]
    InvalidInput(String),

    #[error("Command timed out after {:.1}s", as_secs(.timeout_ms))]
    Timeout { timeout_ms: u64 },

    /// Spawn errors and nonzero exit codes.
    #[error("{0}")]
    ProcessFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn as_secs(ms: &u64) -> f64 {
    *ms as f64 / 1000.0
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => ToolError::NotFound(e.to_string()),
            _ => ToolError::Internal(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::InvalidInput(format!("Invalid arguments: {e}"))
    }
}

/// Errors from the edit matcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("old_string not found in file; make sure it matches the file content exactly")]
    NotFound,

    #[error(
        "old_string occurs {0} times in the file; provide more surrounding context or set replace_all=true"
    )]
    AmbiguousMatch(usize),

    #[error("new_string must differ from old_string")]
    NoOpEdit,

    #[error("old_string must not be empty")]
    EmptyOldText,
}

impl From<EditError> for ToolError {
    fn from(e: EditError) -> Self {
        match e {
            EditError::NotFound => ToolError::NotFound(e.to_string()),
            _ => ToolError::InvalidInput(e.to_string()),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
