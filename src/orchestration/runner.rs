//! The seam between the scheduler and whatever actually runs an agent.
//!
//! A production runner drives a model loop; tests plug in closures via
//! [`runner_fn`].

use std::future::Future;

use async_trait::async_trait;

use crate::session::TaskId;

/// Everything a runner gets to know about one sub-agent run.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub task_id: TaskId,
    pub prompt: String,
    pub description: String,
    pub subagent_type: String,
}

/// Executes one sub-agent run to completion.
///
/// An `Err` (or a panic) marks the task failed; the scheduler records the
/// error chain as the task's result.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, request: AgentRequest) -> anyhow::Result<String>;
}

/// Adapter turning an async closure into an [`AgentRunner`].
pub struct FnRunner<F>(F);

/// Wrap `f` as an [`AgentRunner`].
pub fn runner_fn<F, Fut>(f: F) -> FnRunner<F>
where
    F: Fn(AgentRequest) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    FnRunner(f)
}

#[async_trait]
impl<F, Fut> AgentRunner for FnRunner<F>
where
    F: Fn(AgentRequest) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    async fn run(&self, request: AgentRequest) -> anyhow::Result<String> {
        (self.0)(request).await
    }
}

/// Runner for sessions without a model backend. Every run fails.
#[derive(Debug, Default)]
pub struct UnconfiguredRunner;

#[async_trait]
impl AgentRunner for UnconfiguredRunner {
    async fn run(&self, request: AgentRequest) -> anyhow::Result<String> {
        anyhow::bail!(
            "no agent runner is configured for this session (task {})",
            request.task_id
        )
    }
}
