//! Session-scoped shared state.
//!
//! [`SessionState`] owns the three registries every tool call may touch: the
//! sub-agent task list, the background shell map, and the todo list. It is an
//! explicit object handed to each component, never a global; clones share the
//! same registries.
//!
//! **Writer discipline:** only the component that created an entry mutates it.
//! The shell manager flips shell status, the scheduler drives task status, and
//! the dispatcher replaces the todo list wholesale. Every registry sits behind
//! its own `Arc<Mutex<..>>` and no lock is ever held across an `.await`.

pub mod events;
pub mod types;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use events::{EventBus, NoopNotifier, Notifier, Observer, SessionEvent};
pub use types::{
    AgentTask, BackgroundShell, ShellId, TaskId, TaskStatus, TodoItem, TodoStatus, ToolResult,
};

/// Shared, append-only output of a background shell.
pub type OutputBuffer = Arc<Mutex<String>>;

/// Lock a registry mutex. A poisoned lock still guards consistent data here
/// because no critical section can panic halfway through an update.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Generate an 8-character lowercase hex id.
fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Internal registry record for a background shell. Callers see
/// [`BackgroundShell`] snapshots.
struct ShellEntry {
    command: String,
    description: String,
    output: OutputBuffer,
    is_running: bool,
    exit_code: Option<i32>,
    started_at: String,
    /// Cancelling this asks the supervisor to kill the process group.
    cancel_token: CancellationToken,
    /// Supervisor task owning the child process; joined on kill.
    supervisor: JoinHandle<()>,
}

impl ShellEntry {
    fn snapshot(&self, shell_id: &str) -> BackgroundShell {
        BackgroundShell {
            shell_id: shell_id.to_string(),
            command: self.command.clone(),
            description: self.description.clone(),
            output_buffer: lock(&self.output).clone(),
            is_running: self.is_running,
            exit_code: self.exit_code,
            started_at: self.started_at.clone(),
        }
    }
}

/// What `kill` needs from a shell it has taken out of the registry.
pub(crate) struct ShellKillHandle {
    pub cancel_token: CancellationToken,
    pub supervisor: JoinHandle<()>,
    pub was_running: bool,
}

/// Shared mutable state of one session.
#[derive(Clone)]
pub struct SessionState {
    tasks: Arc<Mutex<Vec<AgentTask>>>,
    shells: Arc<Mutex<HashMap<ShellId, ShellEntry>>>,
    todos: Arc<Mutex<Vec<TodoItem>>>,
    notifier: Arc<dyn Notifier>,
}

impl SessionState {
    /// Create an empty session publishing through `notifier`.
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(Vec::new())),
            shells: Arc::new(Mutex::new(HashMap::new())),
            todos: Arc::new(Mutex::new(Vec::new())),
            notifier,
        }
    }

    /// Create a session whose notifications go nowhere.
    pub fn detached() -> Self {
        Self::new(Arc::new(NoopNotifier))
    }

    /// Fire-and-forget notification.
    pub fn publish(&self, event: SessionEvent) {
        self.notifier.publish(event);
    }

    // -- Sub-agent tasks ---------------------------------------------------

    /// Register a new task in `Pending` state and return a snapshot of it.
    ///
    /// The id is generated and inserted under one lock, so it is unique and
    /// visible to every reader before this returns.
    pub fn register_task(&self, prompt: &str, description: &str, subagent_type: &str) -> AgentTask {
        let task = {
            let mut tasks = lock(&self.tasks);
            let task_id = loop {
                let candidate = short_id();
                if !tasks.iter().any(|t| t.task_id == candidate) {
                    break candidate;
                }
            };
            let task = AgentTask {
                task_id,
                description: description.to_string(),
                prompt: prompt.to_string(),
                subagent_type: subagent_type.to_string(),
                status: TaskStatus::Pending,
                result: None,
            };
            tasks.push(task.clone());
            task
        };

        self.publish(SessionEvent::TaskStatusChanged {
            task_id: task.task_id.clone(),
            status: TaskStatus::Pending,
        });
        task
    }

    /// Update a task's status, replacing its result when one is given.
    ///
    /// Returns `false` if the id is unknown.
    pub fn set_task_status(&self, task_id: &str, status: TaskStatus, result: Option<String>) -> bool {
        let found = {
            let mut tasks = lock(&self.tasks);
            match tasks.iter_mut().find(|t| t.task_id == task_id) {
                Some(task) => {
                    task.status = status;
                    if result.is_some() {
                        task.result = result;
                    }
                    true
                }
                None => false,
            }
        };

        if found {
            tracing::debug!(task_id, status = %status, "Sub-agent task status changed");
            self.publish(SessionEvent::TaskStatusChanged {
                task_id: task_id.to_string(),
                status,
            });
        }
        found
    }

    /// Snapshot of one task.
    pub fn task(&self, task_id: &str) -> Option<AgentTask> {
        lock(&self.tasks).iter().find(|t| t.task_id == task_id).cloned()
    }

    /// Snapshots of all tasks in registration order.
    pub fn tasks(&self) -> Vec<AgentTask> {
        lock(&self.tasks).clone()
    }

    // -- Background shells -------------------------------------------------

    /// Register a running shell and return its new id.
    ///
    /// `start` receives the id and spawns the supervisor. It runs under the
    /// registry lock, so no caller ever sees the entry without its handle.
    pub(crate) fn register_shell<F>(
        &self,
        command: &str,
        description: &str,
        output: OutputBuffer,
        cancel_token: CancellationToken,
        start: F,
    ) -> ShellId
    where
        F: FnOnce(ShellId) -> JoinHandle<()>,
    {
        let shell_id = {
            let mut shells = lock(&self.shells);
            let shell_id = loop {
                let candidate = short_id();
                if !shells.contains_key(&candidate) {
                    break candidate;
                }
            };
            let supervisor = start(shell_id.clone());
            shells.insert(
                shell_id.clone(),
                ShellEntry {
                    command: command.to_string(),
                    description: description.to_string(),
                    output,
                    is_running: true,
                    exit_code: None,
                    started_at: Utc::now().to_rfc3339(),
                    cancel_token,
                    supervisor,
                },
            );
            shell_id
        };

        self.publish(SessionEvent::ShellStatusChanged {
            shell_id: shell_id.clone(),
            running: true,
            exit_code: None,
        });
        shell_id
    }

    /// Flip a shell to not-running. Only the first call has an effect.
    pub(crate) fn mark_shell_finished(&self, shell_id: &str, exit_code: Option<i32>) {
        let flipped = {
            let mut shells = lock(&self.shells);
            match shells.get_mut(shell_id) {
                Some(entry) if entry.is_running => {
                    entry.is_running = false;
                    entry.exit_code = exit_code;
                    true
                }
                _ => false,
            }
        };

        if flipped {
            self.publish(SessionEvent::ShellStatusChanged {
                shell_id: shell_id.to_string(),
                running: false,
                exit_code,
            });
        }
    }

    /// Remove a shell from the registry and hand back what is needed to
    /// terminate it. `None` if unknown, so of two racing callers only one
    /// gets the handle.
    pub(crate) fn take_shell(&self, shell_id: &str) -> Option<ShellKillHandle> {
        lock(&self.shells).remove(shell_id).map(|entry| ShellKillHandle {
            cancel_token: entry.cancel_token,
            supervisor: entry.supervisor,
            was_running: entry.is_running,
        })
    }

    /// Snapshot of one shell, including its output so far.
    pub fn shell(&self, shell_id: &str) -> Option<BackgroundShell> {
        lock(&self.shells).get(shell_id).map(|e| e.snapshot(shell_id))
    }

    /// Snapshots of all registered shells.
    pub fn shells(&self) -> Vec<BackgroundShell> {
        let shells = lock(&self.shells);
        let mut all: Vec<_> = shells.iter().map(|(id, e)| e.snapshot(id)).collect();
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        all
    }

    /// Ids of all registered shells.
    pub fn shell_ids(&self) -> Vec<ShellId> {
        lock(&self.shells).keys().cloned().collect()
    }

    // -- Todos -------------------------------------------------------------

    /// Replace the whole todo list and publish the new list.
    pub fn replace_todos(&self, todos: Vec<TodoItem>) {
        *lock(&self.todos) = todos.clone();
        self.publish(SessionEvent::TodosUpdated { todos });
    }

    pub fn todos(&self) -> Vec<TodoItem> {
        lock(&self.todos).clone()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::detached()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(text: &str) -> OutputBuffer {
        Arc::new(Mutex::new(text.to_string()))
    }

    #[test]
    fn short_ids_are_eight_hex_chars() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn register_task_starts_pending_and_is_visible() {
        let session = SessionState::detached();
        let task = session.register_task("do it", "a job", "general-purpose");

        assert_eq!(task.status, TaskStatus::Pending);
        let stored = session.task(&task.task_id).unwrap();
        assert_eq!(stored.prompt, "do it");
        assert_eq!(stored.description, "a job");
    }

    #[test]
    fn set_task_status_updates_result() {
        let session = SessionState::detached();
        let task = session.register_task("p", "d", "general-purpose");

        assert!(session.set_task_status(&task.task_id, TaskStatus::Running, None));
        assert!(session.set_task_status(&task.task_id, TaskStatus::Completed, Some("done".into())));

        let stored = session.task(&task.task_id).unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.result.as_deref(), Some("done"));
    }

    #[test]
    fn set_task_status_unknown_id_returns_false() {
        let session = SessionState::detached();
        assert!(!session.set_task_status("ghost", TaskStatus::Failed, None));
    }

    #[test]
    fn tasks_keep_registration_order() {
        let session = SessionState::detached();
        let ids: Vec<_> = (0..5)
            .map(|i| session.register_task("p", &format!("t{i}"), "general-purpose").task_id)
            .collect();
        let listed: Vec<_> = session.tasks().into_iter().map(|t| t.task_id).collect();
        assert_eq!(ids, listed);
    }

    fn idle_supervisor(_: ShellId) -> JoinHandle<()> {
        tokio::spawn(async {})
    }

    #[tokio::test]
    async fn shell_finishes_exactly_once() {
        let session = SessionState::detached();
        let id = session.register_shell(
            "echo hi",
            "echo",
            buffer("hi\n"),
            CancellationToken::new(),
            idle_supervisor,
        );

        session.mark_shell_finished(&id, Some(0));
        session.mark_shell_finished(&id, Some(9));

        let shell = session.shell(&id).unwrap();
        assert!(!shell.is_running);
        assert_eq!(shell.exit_code, Some(0));
        assert_eq!(shell.output_buffer, "hi\n");
    }

    #[tokio::test]
    async fn take_shell_hands_out_entry_once() {
        let session = SessionState::detached();
        let id = session.register_shell("true", "true", buffer(""), CancellationToken::new(), idle_supervisor);

        let taken = session.take_shell(&id).unwrap();
        assert!(taken.was_running);
        assert!(session.shell(&id).is_none());
        assert!(session.take_shell(&id).is_none());
        taken.supervisor.await.unwrap();
    }

    #[tokio::test]
    async fn supervisor_starts_with_registered_id() {
        let session = SessionState::detached();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let id = session.register_shell("true", "true", buffer(""), CancellationToken::new(), |id| {
            let _ = tx.send(id);
            tokio::spawn(async {})
        });
        assert_eq!(rx.await.unwrap(), id);
    }

    #[test]
    fn replace_todos_is_wholesale() {
        let session = SessionState::detached();
        let item = |c: &str| TodoItem {
            content: c.to_string(),
            status: TodoStatus::Pending,
            active_form: String::new(),
        };

        session.replace_todos(vec![item("a"), item("b")]);
        session.replace_todos(vec![item("c")]);

        let todos = session.todos();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].content, "c");
    }

    #[test]
    fn replace_todos_publishes_new_list() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let session = SessionState::new(Arc::new(bus));

        session.replace_todos(vec![TodoItem {
            content: "write tests".into(),
            status: TodoStatus::InProgress,
            active_form: "Writing tests".into(),
        }]);

        match rx.try_recv().unwrap() {
            SessionEvent::TodosUpdated { todos } => assert_eq!(todos[0].content, "write tests"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
