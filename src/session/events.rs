//! Publish/subscribe path from tool execution to observers.
//!
//! Components never talk to a UI directly. They hold a [`Notifier`] and
//! publish [`SessionEvent`]s; the [`EventBus`] fans each event out to
//! synchronous [`Observer`]s (the JSONL session logger, test probes) and to
//! any number of async subscribers via a `tokio::sync::broadcast` channel.
//!
//! Publishing is fire-and-forget. An observer that returns an error or panics
//! is logged and skipped, and a broadcast send with no live receivers is
//! ignored, so a broken consumer can never fault the operation that published.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use super::lock;
use super::types::{ShellId, TaskId, TaskStatus, TodoItem, ToolResult};
use crate::error::panic_message;

/// Default capacity of the broadcast channel. Slow subscribers that fall
/// further behind than this observe `RecvError::Lagged`.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Notification emitted by the tool layer.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A tool call finished. Emitted once per `ToolDispatcher::invoke`.
    ToolCall {
        tool: String,
        args: Value,
        result: ToolResult,
    },

    /// The todo list was replaced.
    TodosUpdated { todos: Vec<TodoItem> },

    /// A background shell started, exited, or was killed.
    ShellStatusChanged {
        shell_id: ShellId,
        running: bool,
        exit_code: Option<i32>,
    },

    /// A sub-agent task changed status.
    TaskStatusChanged { task_id: TaskId, status: TaskStatus },
}

/// The narrow capability components depend on to emit notifications.
pub trait Notifier: Send + Sync {
    fn publish(&self, event: SessionEvent);
}

/// Discards every event. Used for sessions nobody observes.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn publish(&self, _event: SessionEvent) {}
}

/// Synchronous consumer of session events.
///
/// All methods are best-effort: returned errors are logged and ignored.
pub trait Observer: Send + Sync {
    fn on_tool_call(&self, _tool: &str, _args: &Value, _result: &ToolResult) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_todo_update(&self, _todos: &[TodoItem]) -> anyhow::Result<()> {
        Ok(())
    }

    /// Entry point used by the bus. The default routes tool calls and todo
    /// updates to the specific hooks and ignores status changes.
    fn on_event(&self, event: &SessionEvent) -> anyhow::Result<()> {
        match event {
            SessionEvent::ToolCall { tool, args, result } => self.on_tool_call(tool, args, result),
            SessionEvent::TodosUpdated { todos } => self.on_todo_update(todos),
            _ => Ok(()),
        }
    }
}

/// Fan-out hub for [`SessionEvent`]s.
///
/// Cheap to clone; all clones share the same channel and observer list.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    observers: Arc<Mutex<Vec<Arc<dyn Observer>>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            observers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Register a synchronous observer.
    pub fn add_observer(&self, observer: Arc<dyn Observer>) {
        lock(&self.observers).push(observer);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl Notifier for EventBus {
    fn publish(&self, event: SessionEvent) {
        // Observers run outside the lock so one may register another.
        let observers: Vec<Arc<dyn Observer>> = lock(&self.observers).clone();
        for observer in observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!("Observer failed, ignoring: {e:#}"),
                Err(payload) => {
                    tracing::warn!("Observer panicked, ignoring: {}", panic_message(payload.as_ref()))
                }
            }
        }

        // Err only means there are no receivers right now.
        let _ = self.tx.send(event);
    }
}
