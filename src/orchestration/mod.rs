//! Sub-agent orchestration.
//!
//! [`scheduler::SubAgentScheduler`] registers, runs and joins sub-agent tasks;
//! the work itself is delegated to an injected [`runner::AgentRunner`].

pub mod runner;
pub mod scheduler;

pub use runner::{AgentRequest, AgentRunner, FnRunner, UnconfiguredRunner, runner_fn};
pub use scheduler::SubAgentScheduler;
