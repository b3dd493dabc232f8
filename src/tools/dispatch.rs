//! Tool routing.
//!
//! [`ToolDispatcher::invoke`] never fails: malformed arguments, unknown tools,
//! tool errors and even panics inside a tool come back as a failed
//! [`ToolResult`] so the model can observe the problem and react. Every call
//! is published as [`SessionEvent::ToolCall`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::search::{GrepOptions, OutputMode};
use super::{files, resolve_path, search, todo};
use crate::config::AppConfig;
use crate::error::{ToolError, panic_message};
use crate::exec::ShellManager;
use crate::orchestration::{AgentRunner, SubAgentScheduler};
use crate::session::{SessionEvent, SessionState, TaskStatus, TodoItem, ToolResult};

/// Lower bound for `bash` timeouts, in milliseconds.
pub const MIN_TIMEOUT_MS: u64 = 1_000;
/// Upper bound for `bash` timeouts, in milliseconds.
pub const MAX_TIMEOUT_MS: u64 = 600_000;

/// Characters of `edit_file` strings kept in published arguments.
const EDIT_ARG_PREVIEW_CHARS: usize = 50;

const DEFAULT_SUBAGENT_TYPE: &str = "general-purpose";

#[derive(Deserialize)]
struct ReadFileArgs {
    file_path: String,
    offset: Option<usize>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct WriteFileArgs {
    file_path: String,
    content: String,
}

#[derive(Deserialize)]
struct EditFileArgs {
    file_path: String,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

#[derive(Deserialize)]
struct GlobFilesArgs {
    pattern: String,
    path: Option<String>,
}

#[derive(Deserialize)]
struct GrepSearchArgs {
    pattern: String,
    path: Option<String>,
    glob: Option<String>,
    #[serde(default)]
    output_mode: OutputMode,
    #[serde(default)]
    case_insensitive: bool,
    head_limit: Option<usize>,
}

#[derive(Deserialize)]
struct BashArgs {
    command: String,
    timeout: Option<i64>,
    description: Option<String>,
    #[serde(default)]
    run_in_background: bool,
}

#[derive(Deserialize)]
struct BashOutputArgs {
    bash_id: String,
    filter_pattern: Option<String>,
}

#[derive(Deserialize)]
struct KillShellArgs {
    shell_id: String,
}

#[derive(Deserialize)]
struct TaskArgs {
    prompt: String,
    description: String,
    subagent_type: Option<String>,
    #[serde(default = "default_wait")]
    wait: bool,
}

fn default_wait() -> bool {
    true
}

#[derive(Deserialize)]
struct TaskResultArgs {
    task_id: String,
}

#[derive(Deserialize)]
struct TodoWriteArgs {
    todos: Vec<TodoItem>,
}

/// Single entry point for tool invocations within one session.
#[derive(Clone)]
pub struct ToolDispatcher {
    config: Arc<AppConfig>,
    session: SessionState,
    shells: ShellManager,
    scheduler: SubAgentScheduler,
}

impl ToolDispatcher {
    pub fn new(config: AppConfig, session: SessionState, runner: Arc<dyn AgentRunner>) -> Self {
        let shells = ShellManager::new(
            session.clone(),
            config.workspace.clone(),
            config.max_output_chars,
        );
        let scheduler = SubAgentScheduler::new(session.clone(), runner);
        Self {
            config: Arc::new(config),
            session,
            shells,
            scheduler,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn shells(&self) -> &ShellManager {
        &self.shells
    }

    pub fn scheduler(&self) -> &SubAgentScheduler {
        &self.scheduler
    }

    /// Run one tool call and publish it.
    pub async fn invoke(&self, tool: &str, args: Value) -> ToolResult {
        tracing::debug!(tool, "Dispatching tool call");

        let outcome = AssertUnwindSafe(self.route(tool, &args)).catch_unwind().await;
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => e.into(),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(tool, "Tool panicked: {message}");
                ToolError::Internal(format!("{tool} panicked: {message}")).into()
            }
        };

        if let Some(error) = result.error() {
            tracing::debug!(tool, "Tool call failed: {error}");
        }

        self.session.publish(SessionEvent::ToolCall {
            tool: tool.to_string(),
            args: summarize_args(tool, &args),
            result: result.clone(),
        });
        result
    }

    async fn route(&self, tool: &str, args: &Value) -> Result<ToolResult, ToolError> {
        let workspace = self.config.workspace.as_path();

        let output = match tool {
            super::READ_FILE => {
                let a: ReadFileArgs = parse(args)?;
                let path = resolve_path(workspace, &a.file_path);
                let limit = a.limit.unwrap_or(self.config.read_limit);
                files::read_file(&path, &a.file_path, a.offset, limit, self.config.max_line_chars)
                    .await?
            }
            super::WRITE_FILE => {
                let a: WriteFileArgs = parse(args)?;
                let path = resolve_path(workspace, &a.file_path);
                files::write_file(&path, &a.file_path, &a.content).await?
            }
            super::EDIT_FILE => {
                let a: EditFileArgs = parse(args)?;
                let path = resolve_path(workspace, &a.file_path);
                files::edit_file(&path, &a.file_path, &a.old_string, &a.new_string, a.replace_all)
                    .await?
            }
            super::GLOB_FILES => {
                let a: GlobFilesArgs = parse(args)?;
                let root = resolve_path(workspace, a.path.as_deref().unwrap_or("."));
                search::glob_files(workspace, root, &a.pattern).await?
            }
            super::GREP_SEARCH => {
                let a: GrepSearchArgs = parse(args)?;
                let options = GrepOptions {
                    pattern: a.pattern,
                    root: resolve_path(workspace, a.path.as_deref().unwrap_or(".")),
                    glob: a.glob,
                    output_mode: a.output_mode,
                    case_insensitive: a.case_insensitive,
                    head_limit: a.head_limit,
                    max_output_chars: self.config.max_output_chars,
                };
                search::grep_search(workspace, options).await?
            }
            super::BASH => return self.bash(parse(args)?).await,
            super::BASH_OUTPUT => {
                let a: BashOutputArgs = parse(args)?;
                return Ok(self
                    .shells
                    .query_output(&a.bash_id, a.filter_pattern.as_deref()));
            }
            super::KILL_SHELL => {
                let a: KillShellArgs = parse(args)?;
                return Ok(self.shells.kill(&a.shell_id).await);
            }
            super::TASK => return self.task(parse(args)?).await,
            super::WAIT_SUBAGENTS => self.scheduler.wait_all().await,
            super::TASK_RESULT => {
                let a: TaskResultArgs = parse(args)?;
                let task = self
                    .scheduler
                    .result(&a.task_id)
                    .ok_or_else(|| ToolError::NotFound(format!("Task not found: {}", a.task_id)))?;
                let mut output = format!("[{}] {} ({})", task.task_id, task.description, task.status);
                if let Some(result) = task.result.filter(|r| !r.is_empty()) {
                    output.push('\n');
                    output.push_str(&result);
                }
                output
            }
            super::TODO_WRITE => {
                let a: TodoWriteArgs = parse(args)?;
                todo::write_todos(&self.session, a.todos)
            }
            unknown => return Err(ToolError::InvalidInput(format!("Unknown tool: {unknown}"))),
        };

        Ok(ToolResult::success(output))
    }

    async fn bash(&self, a: BashArgs) -> Result<ToolResult, ToolError> {
        if a.run_in_background {
            let shell_id = self
                .shells
                .spawn_background(&a.command, a.description.as_deref())?;
            return Ok(ToolResult::success(format!(
                "Started background shell [ID: {shell_id}]: {}",
                a.description.as_deref().unwrap_or(&a.command)
            )));
        }

        let timeout_ms = clamp_timeout_ms(a.timeout, self.config.default_timeout_ms);
        Ok(self
            .shells
            .run_foreground(&a.command, Duration::from_millis(timeout_ms))
            .await)
    }

    async fn task(&self, a: TaskArgs) -> Result<ToolResult, ToolError> {
        let subagent_type = a.subagent_type.as_deref().unwrap_or(DEFAULT_SUBAGENT_TYPE);
        let (task_id, result) = self
            .scheduler
            .run(&a.prompt, &a.description, subagent_type, !a.wait)
            .await;

        if !a.wait {
            return Ok(ToolResult::success(format!(
                "Created sub-agent task [{task_id}]: {}",
                a.description
            )));
        }

        let failed = self
            .scheduler
            .result(&task_id)
            .is_some_and(|t| t.status == TaskStatus::Failed);
        let output = match result.filter(|r| !r.is_empty()) {
            Some(text) => format!("Sub-agent task [{task_id}] result:\n{text}"),
            None => format!("Sub-agent task [{task_id}] finished with no output"),
        };

        if failed {
            Ok(ToolResult::failure_with_output(
                output,
                format!("Sub-agent task [{task_id}] failed"),
            ))
        } else {
            Ok(ToolResult::success(output))
        }
    }
}

fn parse<T: DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    Ok(serde_json::from_value(args.clone())?)
}

/// Requested timeout clamped to the allowed window; `default_ms` when none
/// was given.
pub fn clamp_timeout_ms(requested: Option<i64>, default_ms: u64) -> u64 {
    match requested {
        Some(ms) => ms.clamp(MIN_TIMEOUT_MS as i64, MAX_TIMEOUT_MS as i64) as u64,
        None => default_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS),
    }
}

/// Arguments as they are published: file contents are replaced by their
/// size and edit strings are shortened.
fn summarize_args(tool: &str, args: &Value) -> Value {
    let mut summary = args.clone();
    let Some(map) = summary.as_object_mut() else {
        return summary;
    };

    match tool {
        super::WRITE_FILE => {
            if let Some(content) = map.get("content").and_then(Value::as_str) {
                let chars = content.chars().count();
                map.insert("content".to_string(), json!(format!("<{chars} chars>")));
            }
        }
        super::EDIT_FILE => {
            for key in ["old_string", "new_string"] {
                if let Some(text) = map.get(key).and_then(Value::as_str) {
                    let preview: String = text.chars().take(EDIT_ARG_PREVIEW_CHARS).collect();
                    map.insert(key.to_string(), json!(preview));
                }
            }
        }
        _ => {}
    }
    summary
}
