//! JSONL diagnostic log for a session.
//!
//! Each session produces `session-{ISO8601}.jsonl` in the configured log
//! directory. The logger is attached to the [`EventBus`](crate::session::EventBus)
//! as an observer, so every tool call, todo update and status transition
//! becomes one self-describing JSON line.
//!
//! Uses synchronous `std::fs` since writes are small, buffered, and flushed
//! after each event. A single mutex serializes writers, so line order is
//! append order.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::session::{Observer, SessionEvent, TaskStatus, TodoItem, ToolResult, lock};

/// Returns the current UTC time as an ISO 8601 string with milliseconds.
fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// A structured log entry serialized as a single JSON line.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LogEntry {
    SessionStart {
        timestamp: String,
        workspace: String,
    },

    /// A finished tool call with its (summarized) arguments.
    ToolCall {
        timestamp: String,
        tool: String,
        args: Value,
        success: bool,
        output: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    TodosUpdated {
        timestamp: String,
        todos: Vec<TodoItem>,
    },

    ShellStatus {
        timestamp: String,
        shell_id: String,
        running: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },

    TaskStatus {
        timestamp: String,
        task_id: String,
        status: TaskStatus,
    },

    SessionEnd {
        timestamp: String,
        reason: String,
    },
}

impl LogEntry {
    fn from_event(event: &SessionEvent) -> Self {
        let timestamp = now_iso();
        match event {
            SessionEvent::ToolCall { tool, args, result } => LogEntry::ToolCall {
                timestamp,
                tool: tool.clone(),
                args: args.clone(),
                success: result.is_success(),
                output: result.output().to_string(),
                error: result.error().map(str::to_string),
            },
            SessionEvent::TodosUpdated { todos } => LogEntry::TodosUpdated {
                timestamp,
                todos: todos.clone(),
            },
            SessionEvent::ShellStatusChanged {
                shell_id,
                running,
                exit_code,
            } => LogEntry::ShellStatus {
                timestamp,
                shell_id: shell_id.clone(),
                running: *running,
                exit_code: *exit_code,
            },
            SessionEvent::TaskStatusChanged { task_id, status } => LogEntry::TaskStatus {
                timestamp,
                task_id: task_id.clone(),
                status: *status,
            },
        }
    }
}

/// Append-only JSONL logger.
pub struct SessionLogger {
    writer: Mutex<BufWriter<fs::File>>,
    log_path: PathBuf,
}

impl SessionLogger {
    /// Create a logger writing a fresh timestamped file under `log_dir`.
    ///
    /// Colons in the timestamp are replaced by dashes for filesystem safety.
    pub fn new(log_dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let session_id = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3f").to_string();
        let log_path = log_dir.join(format!("session-{session_id}.jsonl"));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            log_path,
        })
    }

    /// Serialize a log entry as a single JSON line and flush.
    pub fn log_event(&self, entry: &LogEntry) -> anyhow::Result<()> {
        let mut writer = lock(&self.writer);
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn log_session_start(&self, workspace: &Path) -> anyhow::Result<()> {
        self.log_event(&LogEntry::SessionStart {
            timestamp: now_iso(),
            workspace: workspace.display().to_string(),
        })
    }

    pub fn log_session_end(&self, reason: &str) -> anyhow::Result<()> {
        self.log_event(&LogEntry::SessionEnd {
            timestamp: now_iso(),
            reason: reason.to_string(),
        })
    }
}

impl Observer for SessionLogger {
    fn on_tool_call(&self, tool: &str, args: &Value, result: &ToolResult) -> anyhow::Result<()> {
        self.on_event(&SessionEvent::ToolCall {
            tool: tool.to_string(),
            args: args.clone(),
            result: result.clone(),
        })
    }

    fn on_todo_update(&self, todos: &[TodoItem]) -> anyhow::Result<()> {
        self.on_event(&SessionEvent::TodosUpdated {
            todos: todos.to_vec(),
        })
    }

    fn on_event(&self, event: &SessionEvent) -> anyhow::Result<()> {
        self.log_event(&LogEntry::from_event(event))
    }
}
