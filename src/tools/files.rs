//! File tools: read, write, edit.

use std::io::ErrorKind;
use std::path::Path;

use crate::edit::{find_replacement, unified_diff};
use crate::error::ToolError;

/// Read `path` and render it `cat -n` style.
///
/// `offset` is the 1-indexed first line; lines longer than `max_line_chars`
/// characters are cut and suffixed with `...`.
pub async fn read_file(
    path: &Path,
    display: &str,
    offset: Option<usize>,
    limit: usize,
    max_line_chars: usize,
) -> Result<String, ToolError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| not_found_or(e, display))?;
    if !metadata.is_file() {
        return Err(ToolError::InvalidInput(format!("Not a file: {display}")));
    }

    let bytes = tokio::fs::read(path).await?;
    let content = String::from_utf8(bytes).map_err(|_| {
        ToolError::InvalidInput(format!("Cannot read {display}: file is not valid UTF-8 (binary?)"))
    })?;

    let lines: Vec<&str> = content.lines().collect();
    let start = offset.unwrap_or(1).max(1) - 1;
    let end = start.saturating_add(limit);

    let mut rendered: Vec<String> = Vec::new();
    for (idx, line) in lines.iter().enumerate().take(end).skip(start) {
        rendered.push(format!("{:6}\t{}", idx + 1, truncate_line(line, max_line_chars)));
    }

    let mut output = rendered.join("\n");
    if end < lines.len() {
        output.push_str(&format!("\n\n... {} more lines not shown", lines.len() - end));
    }
    Ok(output)
}

/// Create or overwrite `path`, creating parent directories.
pub async fn write_file(path: &Path, display: &str, content: &str) -> Result<String, ToolError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(format!("Wrote {display} ({} chars)", content.chars().count()))
}

/// Apply one edit to `path` and return a summary with a unified diff.
pub async fn edit_file(
    path: &Path,
    display: &str,
    old_string: &str,
    new_string: &str,
    replace_all: bool,
) -> Result<String, ToolError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| not_found_or(e, display))?;

    let replacement = find_replacement(&content, old_string, new_string, replace_all)?;
    tokio::fs::write(path, &replacement.new_content).await?;

    tracing::debug!(path = %path.display(), replaced = replacement.replaced_count, "File edited");

    let plural = if replacement.replaced_count == 1 { "" } else { "s" };
    let diff = unified_diff(&content, &replacement.new_content, display);
    Ok(format!(
        "Updated {display} ({} replacement{plural})\n\n{diff}",
        replacement.replaced_count
    ))
}

fn not_found_or(e: std::io::Error, display: &str) -> ToolError {
    if e.kind() == ErrorKind::NotFound {
        ToolError::NotFound(format!("File not found: {display}"))
    } else {
        e.into()
    }
}

fn truncate_line(line: &str, max_chars: usize) -> String {
    match line.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &line[..byte_idx]),
        None => line.to_string(),
    }
}
