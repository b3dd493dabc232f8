//! Sub-agent scheduling: foreground runs, background runs, and fan-in.
//!
//! Every run is registered as `pending` before anything executes and moves to
//! `running` right before the runner is invoked. The execution path always
//! ends in `completed` or `failed`, including when the runner panics.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::task::JoinHandle;

use super::runner::{AgentRequest, AgentRunner};
use crate::error::panic_message;
use crate::session::{AgentTask, SessionState, TaskId, TaskStatus, lock};

/// Returned by [`SubAgentScheduler::wait_all`] when there is nothing to report.
pub const NO_TASKS_MESSAGE: &str = "No sub-agent tasks are running";

/// Starts sub-agent runs and tracks the background ones until joined.
#[derive(Clone)]
pub struct SubAgentScheduler {
    session: SessionState,
    runner: Arc<dyn AgentRunner>,
    /// Background runs not yet joined by `wait_all`.
    outstanding: Arc<Mutex<HashMap<TaskId, JoinHandle<()>>>>,
}

impl SubAgentScheduler {
    pub fn new(session: SessionState, runner: Arc<dyn AgentRunner>) -> Self {
        Self {
            session,
            runner,
            outstanding: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a sub-agent run.
    ///
    /// With `background` false this waits for the run to finish and returns
    /// its stored result (the failure description for failed runs). With
    /// `background` true it returns the task id immediately and no result.
    pub async fn run(
        &self,
        prompt: &str,
        description: &str,
        subagent_type: &str,
        background: bool,
    ) -> (TaskId, Option<String>) {
        if background {
            // Registration, spawn and tracking happen under one lock so a
            // concurrent `wait_all` never sees a started run it cannot join.
            let mut outstanding = lock(&self.outstanding);
            let request = self.register(prompt, description, subagent_type);
            let task_id = request.task_id.clone();
            let handle = tokio::spawn(execute(self.session.clone(), self.runner.clone(), request));
            outstanding.retain(|_, h| !h.is_finished());
            outstanding.insert(task_id.clone(), handle);
            drop(outstanding);

            tracing::info!(task_id = %task_id, description, "Sub-agent started in background");
            return (task_id, None);
        }

        let request = self.register(prompt, description, subagent_type);
        let task_id = request.task_id.clone();
        tracing::info!(task_id = %task_id, description, "Sub-agent started");
        execute(self.session.clone(), self.runner.clone(), request).await;
        let result = self.session.task(&task_id).and_then(|t| t.result);
        (task_id, result)
    }

    /// Join every outstanding background run, then summarize all finished
    /// tasks in registration order.
    ///
    /// Runs started while this is waiting are not joined by this call.
    pub async fn wait_all(&self) -> String {
        let handles: Vec<(TaskId, JoinHandle<()>)> = lock(&self.outstanding).drain().collect();

        for (task_id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::warn!(task_id = %task_id, "Sub-agent task did not finish cleanly: {e}");
                let stuck = self
                    .session
                    .task(&task_id)
                    .is_some_and(|t| !t.status.is_terminal());
                if stuck {
                    self.session.set_task_status(
                        &task_id,
                        TaskStatus::Failed,
                        Some(format!("Sub-agent task aborted: {e}")),
                    );
                }
            }
        }

        let finished: Vec<AgentTask> = self
            .session
            .tasks()
            .into_iter()
            .filter(|t| t.status.is_terminal())
            .collect();
        if finished.is_empty() {
            return NO_TASKS_MESSAGE.to_string();
        }

        let mut summary = String::new();
        for task in finished {
            let head = format!("[{}] {}", task.task_id, task.description);
            summary.push_str(&format!("{} ({})\n", head.trim_end(), task.status));
            if let Some(result) = task.result.as_deref().filter(|r| !r.is_empty()) {
                summary.push_str(result);
                summary.push_str("\n\n");
            }
        }
        summary.truncate(summary.trim_end().len());
        summary
    }

    fn register(&self, prompt: &str, description: &str, subagent_type: &str) -> AgentRequest {
        let task = self.session.register_task(prompt, description, subagent_type);
        AgentRequest {
            task_id: task.task_id,
            prompt: task.prompt,
            description: task.description,
            subagent_type: task.subagent_type,
        }
    }

    /// Snapshot of one task.
    pub fn result(&self, task_id: &str) -> Option<AgentTask> {
        self.session.task(task_id)
    }

    /// Number of background runs not yet joined.
    pub fn outstanding(&self) -> usize {
        lock(&self.outstanding).len()
    }
}

/// Drive one task from `pending` to a terminal status.
async fn execute(session: SessionState, runner: Arc<dyn AgentRunner>, request: AgentRequest) {
    let task_id = request.task_id.clone();
    session.set_task_status(&task_id, TaskStatus::Running, None);

    let outcome = AssertUnwindSafe(runner.run(request)).catch_unwind().await;
    let (status, result) = match outcome {
        Ok(Ok(text)) => (TaskStatus::Completed, text),
        Ok(Err(e)) => (TaskStatus::Failed, format!("Error: {e:#}")),
        Err(payload) => (
            TaskStatus::Failed,
            format!("Sub-agent panicked: {}", panic_message(payload.as_ref())),
        ),
    };

    if status == TaskStatus::Failed {
        tracing::warn!(task_id = %task_id, "Sub-agent failed: {result}");
    }
    session.set_task_status(&task_id, status, Some(result));
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;
    use std::time::Duration;

    use super::*;
    use crate::orchestration::runner::runner_fn;

    fn scheduler<R: AgentRunner + 'static>(runner: R) -> SubAgentScheduler {
        SubAgentScheduler::new(SessionState::detached(), Arc::new(runner))
    }

    #[tokio::test]
    async fn foreground_run_returns_result() {
        let sched = scheduler(runner_fn(|req: AgentRequest| async move {
            anyhow::Ok(format!("echo: {}", req.prompt))
        }));
        let (id, result) = sched.run("hello", "greet", "general-purpose", false).await;

        assert_eq!(result.as_deref(), Some("echo: hello"));
        assert_eq!(sched.result(&id).unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn background_run_is_tracked_before_it_starts() {
        let slot: Arc<OnceLock<SubAgentScheduler>> = Arc::new(OnceLock::new());
        let seen = slot.clone();
        let sched = scheduler(runner_fn(move |req: AgentRequest| {
            let seen = seen.clone();
            async move {
                let tracked = seen
                    .get()
                    .is_some_and(|s| lock(&s.outstanding).contains_key(&req.task_id));
                anyhow::Ok(tracked.to_string())
            }
        }));
        let _ = slot.set(sched.clone());

        for i in 0..20 {
            sched.run(&format!("p{i}"), "d", "general-purpose", true).await;
        }
        for _ in 0..200 {
            if sched.session.tasks().iter().all(|t| t.status.is_terminal()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sched.wait_all().await;

        for task in sched.session.tasks() {
            assert_eq!(task.result.as_deref(), Some("true"), "task {}", task.task_id);
        }
    }

    #[tokio::test]
    async fn runner_error_marks_failed() {
        let sched = scheduler(runner_fn(|_| async {
            Err::<String, _>(anyhow::anyhow!("model unavailable"))
        }));
        let (id, result) = sched.run("p", "d", "general-purpose", false).await;

        assert_eq!(result.as_deref(), Some("Error: model unavailable"));
        assert_eq!(sched.result(&id).unwrap().status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn runner_panic_marks_failed() {
        let sched = scheduler(runner_fn(|_| async {
            if true {
                panic!("runner bug");
            }
            anyhow::Ok(String::new())
        }));
        let (id, result) = sched.run("p", "d", "general-purpose", false).await;

        assert!(result.unwrap().contains("runner bug"));
        assert_eq!(sched.result(&id).unwrap().status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn background_run_returns_immediately() {
        let sched = scheduler(runner_fn(|_| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            anyhow::Ok("late".to_string())
        }));
        let (id, result) = sched.run("p", "slow", "general-purpose", true).await;

        assert!(result.is_none());
        let status = sched.result(&id).unwrap().status;
        assert!(matches!(status, TaskStatus::Pending | TaskStatus::Running));

        let summary = sched.wait_all().await;
        assert_eq!(summary, format!("[{id}] slow (completed)\nlate"));
        assert_eq!(sched.outstanding(), 0);
    }

    #[tokio::test]
    async fn wait_all_with_nothing_to_report() {
        let sched = scheduler(runner_fn(|_| async { anyhow::Ok(String::new()) }));
        assert_eq!(sched.wait_all().await, NO_TASKS_MESSAGE);
    }
}
