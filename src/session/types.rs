//! Type definitions for the session state model.
//!
//! These types form the shared vocabulary between the [`super::SessionState`]
//! registries, the tool dispatcher, the shell manager, the sub-agent scheduler,
//! and any observer rendering session activity. All of them derive
//! [`serde::Serialize`] so they can travel through the event bus and the JSONL
//! session log unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Identifier of a sub-agent task (8 lowercase hex characters).
pub type TaskId = String;

/// Identifier of a background shell (8 lowercase hex characters).
pub type ShellId = String;

/// Uniform return envelope of every tool.
///
/// `error` is set exactly when `success` is false. Fields are private so the
/// invariant can only be established through the constructors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    success: bool,
    output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::failure_with_output(String::new(), error)
    }

    /// A failed result that still carries output, e.g. a command that ran but
    /// exited nonzero.
    pub fn failure_with_output(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl From<ToolError> for ToolResult {
    fn from(e: ToolError) -> Self {
        ToolResult::failure(e.to_string())
    }
}

/// Lifecycle status of a sub-agent task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Registered, execution not started yet.
    Pending,
    /// The agent runner is executing the prompt.
    Running,
    /// Finished with a result.
    Completed,
    /// The runner returned an error or panicked.
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delegated sub-agent run.
///
/// Only the scheduler's execution path for `task_id` mutates `status` and
/// `result`; everyone else works with snapshots.
#[derive(Clone, Debug, Serialize)]
pub struct AgentTask {
    pub task_id: TaskId,
    /// Short (3-5 word) label for display.
    pub description: String,
    pub prompt: String,
    pub subagent_type: String,
    pub status: TaskStatus,
    /// Result text on completion, failure description on failure.
    pub result: Option<String>,
}

/// Snapshot of a background shell.
///
/// The live output buffer is owned by the shell's supervisor; this struct is a
/// copy taken under the buffer lock, so it is always a prefix of what the
/// collector has appended.
#[derive(Clone, Debug, Serialize)]
pub struct BackgroundShell {
    pub shell_id: ShellId,
    pub command: String,
    pub description: String,
    pub output_buffer: String,
    pub is_running: bool,
    /// Exit code once the process has exited on its own. `None` while running
    /// and for processes ended by a signal.
    pub exit_code: Option<i32>,
    /// RFC 3339 timestamp of the spawn.
    pub started_at: String,
}

/// Status of a todo entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    /// Icon used in the `todo_write` summary.
    pub fn icon(self) -> &'static str {
        match self {
            TodoStatus::Pending => "⏳",
            TodoStatus::InProgress => "🔄",
            TodoStatus::Completed => "✅",
        }
    }
}

/// One entry of the session todo list.
///
/// Accepts both `activeForm` (the spelling models tend to produce) and
/// `active_form` on input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default, alias = "activeForm")]
    pub active_form: String,
}
