//! Foreground and background shell execution.
//!
//! Background shells run under a supervisor task that owns the child process:
//!
//! - The child runs in its own process group (`process_group(0)`) so a kill
//!   reaches every descendant
//! - stdout and stderr are appended line by line to a shared buffer, one lock
//!   per line, so readers always see a prefix of the final output
//! - A [`CancellationToken`] asks the supervisor to SIGKILL the group; the
//!   supervisor reaps the child before finishing
//! - The supervisor's `JoinHandle` lives in the session registry and is
//!   joined by [`ShellManager::kill`]

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use super::{execute_shell, kill_process_group, truncate_output};
use crate::error::ToolError;
use crate::session::{
    BackgroundShell, OutputBuffer, SessionEvent, SessionState, ShellId, ToolResult, lock,
};

/// Characters of the command used when no description is given.
const DEFAULT_DESCRIPTION_CHARS: usize = 30;

/// How long a killed shell's pipes may keep draining into the buffer.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runs shell commands for one session.
#[derive(Clone)]
pub struct ShellManager {
    session: SessionState,
    workspace: PathBuf,
    max_output_chars: usize,
}

impl ShellManager {
    pub fn new(session: SessionState, workspace: PathBuf, max_output_chars: usize) -> Self {
        Self {
            session,
            workspace,
            max_output_chars,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Run `command` to completion or until `timeout` expires.
    ///
    /// A nonzero exit is a failure that still carries the command's output.
    pub async fn run_foreground(&self, command: &str, timeout: Duration) -> ToolResult {
        let result = match execute_shell(command, &self.workspace, timeout).await {
            Ok(result) => result,
            Err(e) => return e.into(),
        };

        let output = truncate_output(&result.combined_output(), self.max_output_chars);
        if result.timed_out {
            let err = ToolError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            };
            return ToolResult::failure_with_output(output, err.to_string());
        }

        match result.exit_code {
            Some(0) => ToolResult::success(output),
            Some(code) => ToolResult::failure_with_output(output, format!("exit code: {code}")),
            None => ToolResult::failure_with_output(output, "terminated by signal"),
        }
    }

    /// Start `command` in the background and return its shell id.
    ///
    /// The shell is registered as running before this returns, so an
    /// immediate [`query_output`](Self::query_output) always finds it.
    pub fn spawn_background(
        &self,
        command: &str,
        description: Option<&str>,
    ) -> Result<ShellId, ToolError> {
        #[allow(unused_imports)]
        use std::os::unix::process::CommandExt;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ToolError::ProcessFailure(format!("Failed to spawn background shell: {e}"))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::Internal("Failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ToolError::Internal("Failed to capture stderr".to_string()))?;

        let description = match description {
            Some(d) if !d.trim().is_empty() => d.to_string(),
            _ => command.chars().take(DEFAULT_DESCRIPTION_CHARS).collect(),
        };

        let output: OutputBuffer = Arc::new(Mutex::new(String::new()));
        let cancel_token = CancellationToken::new();
        let pid = child.id();
        let session = self.session.clone();
        let shell_id = self.session.register_shell(
            command,
            &description,
            output.clone(),
            cancel_token.clone(),
            |shell_id| {
                tokio::spawn(supervise(
                    session,
                    shell_id,
                    child,
                    stdout,
                    stderr,
                    output,
                    cancel_token,
                ))
            },
        );

        tracing::info!(shell_id = %shell_id, pid = ?pid, command, "Background shell started");

        Ok(shell_id)
    }

    /// Status header plus the output collected so far, optionally keeping
    /// only lines that match `filter`.
    pub fn query_output(&self, shell_id: &str, filter: Option<&str>) -> ToolResult {
        match self.render_output(shell_id, filter) {
            Ok(output) => ToolResult::success(output),
            Err(e) => e.into(),
        }
    }

    fn render_output(&self, shell_id: &str, filter: Option<&str>) -> Result<String, ToolError> {
        let shell = self
            .session
            .shell(shell_id)
            .ok_or_else(|| ToolError::NotFound(format!("Shell not found: {shell_id}")))?;

        let body = match filter.filter(|p| !p.is_empty()) {
            Some(pattern) => {
                let re = Regex::new(pattern).map_err(|e| {
                    ToolError::InvalidInput(format!("Invalid filter pattern: {e}"))
                })?;
                shell
                    .output_buffer
                    .lines()
                    .filter(|line| re.is_match(line))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            None => shell.output_buffer.clone(),
        };

        let header = status_header(&shell);
        Ok(truncate_output(&format!("{header}\n{body}"), self.max_output_chars))
    }

    /// Drop a shell from the registry and terminate it if it is still
    /// running. Returns once the process has been reaped; a concurrent second
    /// call for the same id gets `NotFound`.
    pub async fn kill(&self, shell_id: &str) -> ToolResult {
        let Some(handle) = self.session.take_shell(shell_id) else {
            return ToolError::NotFound(format!("Shell not found: {shell_id}")).into();
        };

        if handle.was_running {
            handle.cancel_token.cancel();
        }
        if let Err(e) = handle.supervisor.await {
            tracing::warn!(shell_id, "Shell supervisor ended abnormally: {e}");
        }

        // The entry is gone, so the supervisor could not record the stop.
        if handle.was_running {
            self.session.publish(SessionEvent::ShellStatusChanged {
                shell_id: shell_id.to_string(),
                running: false,
                exit_code: None,
            });
        }

        if handle.was_running {
            tracing::info!(shell_id, "Background shell killed");
            ToolResult::success(format!("Killed background shell: {shell_id}"))
        } else {
            tracing::debug!(shell_id, "Removed completed background shell");
            ToolResult::success(format!(
                "Background shell {shell_id} had already completed; removed"
            ))
        }
    }

    /// Snapshots of every registered shell.
    pub fn list(&self) -> Vec<BackgroundShell> {
        self.session.shells()
    }

    /// Kill and remove every registered shell.
    pub async fn shutdown(&self) {
        for shell_id in self.session.shell_ids() {
            let _ = self.kill(&shell_id).await;
        }
    }
}

fn status_header(shell: &BackgroundShell) -> String {
    match (shell.is_running, shell.exit_code) {
        (true, _) => "[running]".to_string(),
        (false, Some(code)) => format!("[completed] (exit code: {code})"),
        (false, None) => "[completed]".to_string(),
    }
}

/// Own the child until it exits or the token is cancelled, then record the
/// final state.
async fn supervise<O, E>(
    session: SessionState,
    shell_id: ShellId,
    mut child: Child,
    stdout: O,
    stderr: E,
    output: OutputBuffer,
    cancel_token: CancellationToken,
) where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let pumps = {
        let (out_buf, err_buf) = (output.clone(), output);
        async move {
            tokio::join!(pump(stdout, out_buf), pump(stderr, err_buf));
        }
    };
    tokio::pin!(pumps);

    let exit_code = tokio::select! {
        _ = &mut pumps => {
            // Both streams closed; the child is exiting.
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => status.code(),
                    Err(e) => {
                        tracing::warn!(shell_id = %shell_id, "Failed to wait for background shell: {e}");
                        None
                    }
                },
                _ = cancel_token.cancelled() => {
                    kill_and_reap(&mut child).await;
                    None
                }
            }
        }
        _ = cancel_token.cancelled() => {
            kill_and_reap(&mut child).await;
            let _ = tokio::time::timeout(DRAIN_GRACE, &mut pumps).await;
            None
        }
    };

    tracing::debug!(shell_id = %shell_id, ?exit_code, "Background shell finished");
    session.mark_shell_finished(&shell_id, exit_code);
}

async fn kill_and_reap(child: &mut Child) {
    kill_process_group(child.id());
    // Reap the child to prevent zombies.
    let _ = child.wait().await;
}

/// Append every line of `stream` to `output` until EOF.
async fn pump<R: AsyncRead + Unpin>(stream: R, output: OutputBuffer) {
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                lock(&output).push_str(&text);
            }
            Err(e) => {
                tracing::debug!("Stopped reading shell output: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &Path) -> ShellManager {
        ShellManager::new(SessionState::detached(), dir.to_path_buf(), 30_000)
    }

    async fn wait_until_finished(mgr: &ShellManager, id: &str) -> BackgroundShell {
        for _ in 0..200 {
            let shell = mgr.session.shell(id).unwrap();
            if !shell.is_running {
                return shell;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("shell {id} never finished");
    }

    #[tokio::test]
    async fn foreground_success() {
        let tmp = tempfile::tempdir().unwrap();
        let r = manager(tmp.path())
            .run_foreground("echo hello", Duration::from_secs(5))
            .await;
        assert!(r.is_success());
        assert_eq!(r.output().trim(), "hello");
    }

    #[tokio::test]
    async fn foreground_nonzero_exit_keeps_output() {
        let tmp = tempfile::tempdir().unwrap();
        let r = manager(tmp.path())
            .run_foreground("echo partial; echo oops >&2; exit 3", Duration::from_secs(5))
            .await;
        assert!(!r.is_success());
        assert_eq!(r.error(), Some("exit code: 3"));
        assert_eq!(r.output(), "partial\n\n[stderr]\noops\n");
    }

    #[tokio::test]
    async fn foreground_output_is_truncated() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = ShellManager::new(SessionState::detached(), tmp.path().to_path_buf(), 10);
        let r = mgr
            .run_foreground("printf 'abcdefghijklmnopqrstuvwxyz'", Duration::from_secs(5))
            .await;
        assert!(r.output().starts_with("abcdefghij"));
        assert!(r.output().ends_with(crate::exec::TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn background_output_collected() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(tmp.path());
        let id = mgr.spawn_background("echo one; echo two", None).unwrap();

        let shell = wait_until_finished(&mgr, &id).await;
        assert_eq!(shell.exit_code, Some(0));
        assert_eq!(shell.output_buffer, "one\ntwo\n");
        assert_eq!(shell.description, "echo one; echo two");

        let r = mgr.query_output(&id, Some("^t"));
        assert!(r.is_success());
        assert_eq!(r.output(), "[completed] (exit code: 0)\ntwo");
    }

    #[tokio::test]
    async fn description_defaults_to_command_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(tmp.path());
        let command = "echo aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        let id = mgr.spawn_background(command, Some("  ")).unwrap();
        let shell = mgr.session.shell(&id).unwrap();
        assert_eq!(shell.description, &command[..30]);
        mgr.kill(&id).await;
    }

    #[tokio::test]
    async fn invalid_filter_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(tmp.path());
        let id = mgr.spawn_background("true", None).unwrap();
        let r = mgr.query_output(&id, Some("(unclosed"));
        assert!(!r.is_success());
        assert!(r.error().unwrap().contains("Invalid filter pattern"));
        mgr.kill(&id).await;
    }

    #[tokio::test]
    async fn unknown_shell_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(tmp.path());
        assert_eq!(mgr.query_output("nope", None).error(), Some("Shell not found: nope"));
        assert_eq!(mgr.kill("nope").await.error(), Some("Shell not found: nope"));
    }

    #[tokio::test]
    async fn kill_running_shell_removes_it() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(tmp.path());
        let id = mgr.spawn_background("sleep 30", None).unwrap();

        let r = mgr.kill(&id).await;
        assert!(r.is_success());
        assert_eq!(r.output(), format!("Killed background shell: {id}"));
        assert!(mgr.session.shell(&id).is_none());
        assert!(!mgr.kill(&id).await.is_success());
    }

    #[tokio::test]
    async fn shutdown_clears_registry() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(tmp.path());
        mgr.spawn_background("sleep 30", None).unwrap();
        mgr.spawn_background("sleep 30", None).unwrap();
        assert_eq!(mgr.list().len(), 2);

        mgr.shutdown().await;
        assert!(mgr.list().is_empty());
    }
}
