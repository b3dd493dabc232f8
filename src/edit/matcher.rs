//! Exact-then-normalized search and replace.
//!
//! Models often reproduce a snippet with the wrong indentation style (tabs vs
//! spaces) or with trailing whitespace stripped. When `old_text` has no exact
//! occurrence, the matcher retries line-wise on normalized text but always
//! replaces the *original* bytes of the matched lines, so everything outside
//! the match is left untouched.

use std::ops::Range;

use crate::error::EditError;

/// Outcome of a successful replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub new_content: String,
    /// Number of occurrences actually replaced (1 unless `replace_all`).
    pub replaced_count: usize,
    /// Original text of the first replaced occurrence. Differs from
    /// `old_text` when the normalized path matched.
    pub matched_text: String,
}

/// Replace `old_text` with `new_text` in `content`.
///
/// Fails with [`EditError::AmbiguousMatch`] when `old_text` occurs more than
/// once and `replace_all` is false, whether the occurrences were found
/// exactly or after normalization.
pub fn find_replacement(
    content: &str,
    old_text: &str,
    new_text: &str,
    replace_all: bool,
) -> Result<Replacement, EditError> {
    if old_text.is_empty() {
        return Err(EditError::EmptyOldText);
    }

    let exact = content.matches(old_text).count();
    if exact > 0 {
        check_replaceable(exact, old_text, new_text, replace_all)?;
        let (new_content, replaced_count) = if replace_all {
            (content.replace(old_text, new_text), exact)
        } else {
            (content.replacen(old_text, new_text, 1), 1)
        };
        return Ok(Replacement {
            new_content,
            replaced_count,
            matched_text: old_text.to_string(),
        });
    }

    let spans = normalized_matches(content, old_text);
    if spans.is_empty() {
        return Err(EditError::NotFound);
    }
    check_replaceable(spans.len(), old_text, new_text, replace_all)?;

    let chosen = if replace_all { &spans[..] } else { &spans[..1] };
    let matched_text = content[chosen[0].clone()].to_string();

    // Back to front so earlier byte offsets stay valid.
    let mut new_content = content.to_string();
    for span in chosen.iter().rev() {
        new_content.replace_range(span.clone(), new_text);
    }

    Ok(Replacement {
        new_content,
        replaced_count: chosen.len(),
        matched_text,
    })
}

fn check_replaceable(
    count: usize,
    old_text: &str,
    new_text: &str,
    replace_all: bool,
) -> Result<(), EditError> {
    if count > 1 && !replace_all {
        return Err(EditError::AmbiguousMatch(count));
    }
    if old_text == new_text {
        return Err(EditError::NoOpEdit);
    }
    Ok(())
}

/// Tabs become four spaces, trailing whitespace is dropped.
fn normalize_line(line: &str) -> String {
    line.replace('\t', "    ").trim_end().to_string()
}

/// A line of `content` with its byte range, excluding the `\n`.
struct LineSpan<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

fn line_spans(content: &str) -> Vec<LineSpan<'_>> {
    let mut spans = Vec::new();
    let mut start = 0;
    for text in content.split('\n') {
        let end = start + text.len();
        spans.push(LineSpan { text, start, end });
        start = end + 1;
    }
    spans
}

/// Byte ranges of every non-overlapping window of `content` lines whose
/// normalized form equals the normalized lines of `old_text`.
fn normalized_matches(content: &str, old_text: &str) -> Vec<Range<usize>> {
    let (needle, wants_newline) = match old_text.strip_suffix('\n') {
        Some(stripped) => (stripped, true),
        None => (old_text, false),
    };
    let needle_lines: Vec<String> = needle.split('\n').map(normalize_line).collect();
    let lines = line_spans(content);
    let window = needle_lines.len();

    let mut matches = Vec::new();
    let mut i = 0;
    while i + window <= lines.len() {
        let candidate = &lines[i..i + window];
        let equal = candidate
            .iter()
            .zip(&needle_lines)
            .all(|(line, want)| normalize_line(line.text) == *want);

        // The window's last line must actually be newline-terminated when
        // the needle ends with one; `split` yields a final line without it.
        let last = &candidate[window - 1];
        let terminated = last.end < content.len();

        if equal && (!wants_newline || terminated) {
            let end = if wants_newline { last.end + 1 } else { last.end };
            matches.push(candidate[0].start..end);
            i += window;
        } else {
            i += 1;
        }
    }
    matches
}
