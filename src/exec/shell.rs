use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use super::kill_process_group;
use crate::error::ToolError;

/// How long readers may keep draining pipes after the child was killed.
/// Grandchildren that escaped the group can hold a pipe open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Result of a shell command execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ExecResult {
    /// stdout and stderr merged for display.
    ///
    /// Both present: `stdout\n[stderr]\nstderr`. Only one present: that one.
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n[stderr]\n{}", self.stdout, self.stderr),
        }
    }
}

/// Run `command` through `sh -c` in `cwd`, killing its process group if it
/// outlives `timeout`.
///
/// The command counts as finished once `sh` has exited and both pipes are
/// closed. On timeout the child is reaped before returning, and whatever
/// output was captured up to the kill is returned with `timed_out` set.
pub async fn execute_shell(
    command: &str,
    cwd: &Path,
    timeout: Duration,
) -> Result<ExecResult, ToolError> {
    #[allow(unused_imports)]
    use std::os::unix::process::CommandExt;

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ToolError::ProcessFailure(format!("Failed to spawn command: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ToolError::Internal("Failed to capture stdout".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ToolError::Internal("Failed to capture stderr".to_string()))?;

    // The group id equals this pid; it outlives `sh` while any descendant
    // is still alive.
    let pgid = child.id();
    let mut stdout_reader = tokio::spawn(read_all(stdout));
    let mut stderr_reader = tokio::spawn(read_all(stderr));
    let mut stdout_text = None;
    let mut stderr_text = None;

    // One deadline covers the exit and both pipes: a backgrounded descendant
    // keeps the pipes open after `sh` itself has returned.
    let finished = tokio::time::timeout(timeout, async {
        let status = child.wait().await;
        stdout_text = Some((&mut stdout_reader).await.unwrap_or_default());
        stderr_text = Some((&mut stderr_reader).await.unwrap_or_default());
        status
    })
    .await;

    match finished {
        Ok(Ok(status)) => Ok(ExecResult {
            stdout: stdout_text.unwrap_or_default(),
            stderr: stderr_text.unwrap_or_default(),
            exit_code: status.code(),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(ToolError::ProcessFailure(format!(
            "Failed to wait for command: {e}"
        ))),
        Err(_) => {
            tracing::info!(command, timeout_ms = timeout.as_millis() as u64, "Command timed out, killing process group");
            kill_process_group(pgid);
            // Reap the child to prevent zombies.
            let _ = child.wait().await;

            let stdout = match stdout_text {
                Some(text) => text,
                None => collect_within(stdout_reader, DRAIN_GRACE).await,
            };
            let stderr = match stderr_text {
                Some(text) => text,
                None => collect_within(stderr_reader, DRAIN_GRACE).await,
            };
            Ok(ExecResult {
                stdout,
                stderr,
                exit_code: None,
                timed_out: true,
            })
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut stream: R) -> String {
    let mut buf = Vec::new();
    // Partial output is still useful if the pipe errors mid-read.
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

async fn collect_within(reader: JoinHandle<String>, grace: Duration) -> String {
    let abort = reader.abort_handle();
    match tokio::time::timeout(grace, reader).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            abort.abort();
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(stdout: &str, stderr: &str) -> ExecResult {
        ExecResult {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: Some(0),
            timed_out: false,
        }
    }

    #[test]
    fn combined_output_merges_streams() {
        assert_eq!(result("out", "err").combined_output(), "out\n[stderr]\nerr");
        assert_eq!(result("out", "").combined_output(), "out");
        assert_eq!(result("", "err").combined_output(), "err");
        assert_eq!(result("", "").combined_output(), "");
    }
}
