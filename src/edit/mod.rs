//! Pure text-editing helpers used by the `edit_file` tool.

pub mod diff;
pub mod matcher;

pub use diff::{DiffKind, DiffLine, diff_lines, format_diff, unified_diff};
pub use matcher::{Replacement, find_replacement};
