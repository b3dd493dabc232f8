//! Process execution: one-shot foreground commands and the background shell
//! manager.

pub mod manager;
pub mod shell;

pub use manager::ShellManager;
pub use shell::{ExecResult, execute_shell};

/// Marker appended when output is cut.
pub const TRUNCATION_MARKER: &str = "\n... output truncated";

/// SIGKILL the whole process group led by `pid`.
///
/// Children are spawned with `process_group(0)`, so the group id equals the
/// child pid and grandchildren (`sh -c 'a | b'`) die with it.
pub(crate) fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        let pgid = nix::unistd::Pid::from_raw(pid as i32);
        if let Err(e) = nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGKILL) {
            tracing::debug!(pid, "killpg failed (group already gone?): {e}");
        }
    }
}

/// Cut `output` to at most `max_chars` characters, appending
/// [`TRUNCATION_MARKER`] when anything was dropped.
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    match output.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &output[..byte_idx]),
        None => output.to_string(),
    }
}
