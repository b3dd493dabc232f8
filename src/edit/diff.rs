//! Line diffs for edit previews.
//!
//! [`unified_diff`] produces the familiar format:
//! ```text
//! --- a/src/lib.rs
//! +++ b/src/lib.rs
//! @@ -start,count +start,count @@
//!  context line
//! -removed line
//! +added line
//! ```

/// Unchanged lines shown around each change.
const CONTEXT_LINES: usize = 3;

/// Follows a line that has no terminator in its file.
const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file\n";

/// Above this many LCS cells the alignment degrades to remove-all/add-all.
const MAX_LCS_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Add,
    Remove,
    Context,
}

/// One aligned line. Line numbers are 1-based and absent on the side the
/// line does not exist in.
///
/// `content` excludes the `\n` terminator but keeps a `\r`, so CRLF and LF
/// lines never compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffKind,
    pub content: String,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
    /// Last line of its side and not terminated by `\n`.
    pub missing_newline: bool,
}

impl DiffLine {
    fn new(kind: DiffKind, raw: &str, old_line: Option<usize>, new_line: Option<usize>) -> Self {
        let (content, missing_newline) = match raw.strip_suffix('\n') {
            Some(body) => (body, false),
            None => (raw, true),
        };
        Self {
            kind,
            content: content.to_string(),
            old_line,
            new_line,
            missing_newline,
        }
    }
}

/// Align `old` and `new` line by line using a longest-common-subsequence
/// table. Lines are compared with their terminators.
pub fn diff_lines(old: &str, new: &str) -> Vec<DiffLine> {
    let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
    let new_lines: Vec<&str> = new.split_inclusive('\n').collect();
    let (n, m) = (old_lines.len(), new_lines.len());

    if n.saturating_mul(m) > MAX_LCS_CELLS {
        let removed = old_lines
            .iter()
            .enumerate()
            .map(|(i, l)| DiffLine::new(DiffKind::Remove, l, Some(i + 1), None));
        let added = new_lines
            .iter()
            .enumerate()
            .map(|(j, l)| DiffLine::new(DiffKind::Add, l, None, Some(j + 1)));
        return removed.chain(added).collect();
    }

    // lcs[i][j] = LCS length of old[i..] and new[j..]; walking forward keeps
    // removals ahead of additions within a changed block.
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old_lines[i] == new_lines[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && old_lines[i] == new_lines[j] {
            out.push(DiffLine::new(DiffKind::Context, old_lines[i], Some(i + 1), Some(j + 1)));
            i += 1;
            j += 1;
        } else if i < n && (j == m || lcs[i + 1][j] >= lcs[i][j + 1]) {
            out.push(DiffLine::new(DiffKind::Remove, old_lines[i], Some(i + 1), None));
            i += 1;
        } else {
            out.push(DiffLine::new(DiffKind::Add, new_lines[j], None, Some(j + 1)));
            j += 1;
        }
    }
    out
}

/// Render a unified diff of `old` → `new`. Empty when nothing changed.
pub fn unified_diff(old: &str, new: &str, file_name: &str) -> String {
    let lines = diff_lines(old, new);
    let hunks = hunk_ranges(&lines, CONTEXT_LINES);
    if hunks.is_empty() {
        return String::new();
    }

    let mut out = format!("--- a/{file_name}\n+++ b/{file_name}\n");
    for (lo, hi) in hunks {
        let before = &lines[..lo];
        let body = &lines[lo..hi];

        let old_before = before.iter().filter(|l| l.kind != DiffKind::Add).count();
        let new_before = before.iter().filter(|l| l.kind != DiffKind::Remove).count();
        let old_count = body.iter().filter(|l| l.kind != DiffKind::Add).count();
        let new_count = body.iter().filter(|l| l.kind != DiffKind::Remove).count();

        // An empty side is addressed by the line it follows.
        let old_start = if old_count == 0 { old_before } else { old_before + 1 };
        let new_start = if new_count == 0 { new_before } else { new_before + 1 };

        out.push_str(&format!("@@ -{old_start},{old_count} +{new_start},{new_count} @@\n"));
        for line in body {
            let marker = match line.kind {
                DiffKind::Add => '+',
                DiffKind::Remove => '-',
                DiffKind::Context => ' ',
            };
            out.push(marker);
            out.push_str(&line.content);
            out.push('\n');
            if line.missing_newline {
                out.push_str(NO_NEWLINE_MARKER);
            }
        }
    }
    out
}

/// Human-oriented rendering with two-column markers.
pub fn format_diff(lines: &[DiffLine]) -> String {
    let mut out = String::new();
    for line in lines {
        let marker = match line.kind {
            DiffKind::Add => "+ ",
            DiffKind::Remove => "- ",
            DiffKind::Context => "  ",
        };
        out.push_str(marker);
        out.push_str(&line.content);
        out.push('\n');
    }
    out
}

/// Half-open index ranges into `lines`, one per hunk, with overlapping
/// context merged.
fn hunk_ranges(lines: &[DiffLine], context: usize) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if line.kind == DiffKind::Context {
            continue;
        }
        let lo = idx.saturating_sub(context);
        let hi = (idx + context + 1).min(lines.len());
        match ranges.last_mut() {
            Some(last) if lo <= last.1 => last.1 = last.1.max(hi),
            _ => ranges.push((lo, hi)),
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(lines: &[DiffLine], skip: DiffKind) -> Vec<String> {
        lines
            .iter()
            .filter(|l| l.kind != skip)
            .map(|l| l.content.clone())
            .collect()
    }

    #[test]
    fn alignment_reconstructs_both_sides() {
        let old = "a\nb\nc\nd\ne\n";
        let new = "a\nc\nx\nd\ne\nf\n";
        let lines = diff_lines(old, new);
        assert_eq!(side(&lines, DiffKind::Add), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(side(&lines, DiffKind::Remove), vec!["a", "c", "x", "d", "e", "f"]);
    }

    #[test]
    fn identical_inputs_are_all_context() {
        let lines = diff_lines("one\ntwo\n", "one\ntwo\n");
        assert!(lines.iter().all(|l| l.kind == DiffKind::Context));
        assert_eq!(unified_diff("one\ntwo\n", "one\ntwo\n", "f.txt"), "");
    }

    #[test]
    fn line_numbers_track_each_side() {
        let lines = diff_lines("keep\nold\n", "keep\nnew\n");
        assert_eq!(lines[1].kind, DiffKind::Remove);
        assert_eq!(lines[1].old_line, Some(2));
        assert_eq!(lines[2].kind, DiffKind::Add);
        assert_eq!(lines[2].new_line, Some(2));
    }

    #[test]
    fn unified_single_change_with_context() {
        let old = "l1\nl2\nl3\nl4\nl5\nl6\nl7\n";
        let new = "l1\nl2\nl3\nCHANGED\nl5\nl6\nl7\n";
        let diff = unified_diff(old, new, "notes.txt");
        let expected = "--- a/notes.txt\n+++ b/notes.txt\n@@ -1,7 +1,7 @@\n l1\n l2\n l3\n-l4\n+CHANGED\n l5\n l6\n l7\n";
        assert_eq!(diff, expected);
    }

    #[test]
    fn distant_changes_produce_two_hunks() {
        let old: String = (1..=20).map(|i| format!("line{i}\n")).collect();
        let new = old.replace("line2\n", "two\n").replace("line18\n", "eighteen\n");
        let diff = unified_diff(&old, &new, "f");
        assert_eq!(diff.matches("@@ -").count(), 2);
        assert!(diff.contains("@@ -1,5 +1,5 @@"));
        assert!(diff.contains("@@ -15,6 +15,6 @@"));
    }

    #[test]
    fn pure_insertion_into_empty_file() {
        let diff = unified_diff("", "hello\n", "new.txt");
        assert!(diff.contains("@@ -0,0 +1,1 @@"));
        assert!(diff.contains("+hello"));
    }

    /// Apply a diff produced by [`unified_diff`] to `old`.
    fn apply(old: &str, diff: &str) -> String {
        let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
        let mut out = String::new();
        let mut cursor = 0;
        let mut last_marker = ' ';

        for line in diff.split_inclusive('\n').skip(2) {
            if let Some(header) = line.strip_prefix("@@ -") {
                let (range, _) = header.split_once(' ').unwrap();
                let (start, count) = range.split_once(',').unwrap();
                let start: usize = start.parse().unwrap();
                let count: usize = count.parse().unwrap();
                let begin = if count == 0 { start } else { start - 1 };
                out.extend(old_lines[cursor..begin].iter().copied());
                cursor = begin;
            } else if line.starts_with('\\') {
                if last_marker != '-' {
                    assert_eq!(out.pop(), Some('\n'));
                }
            } else {
                let (marker, body) = line.split_at(1);
                last_marker = marker.chars().next().unwrap();
                match last_marker {
                    ' ' => {
                        out.push_str(body);
                        cursor += 1;
                    }
                    '-' => cursor += 1,
                    '+' => out.push_str(body),
                    other => panic!("unexpected marker {other:?}"),
                }
            }
        }
        out.extend(old_lines[cursor..].iter().copied());
        out
    }

    #[test]
    fn diff_reapplies_to_reproduce_new() {
        let cases = [
            ("a\nx\n", "a\nx"),
            ("a\nx", "a\nx\n"),
            ("a\r\nb\n", "a\nb\n"),
            ("a\nb\n", "a\r\nb\r\n"),
            ("keep\nold", "keep\nnew"),
            ("", "only"),
            ("gone", ""),
        ];
        for (old, new) in cases {
            let diff = unified_diff(old, new, "f");
            assert!(!diff.is_empty(), "{old:?} -> {new:?} produced no diff");
            assert_eq!(apply(old, &diff), new, "diff was:\n{diff}");
        }

        let old: String = (1..=30).map(|i| format!("line{i}\n")).collect();
        let new = old.replace("line3\n", "three\n").replace("line25\n", "");
        assert_eq!(apply(&old, &unified_diff(&old, &new, "f")), new);
    }

    #[test]
    fn trailing_newline_change_is_marked() {
        let diff = unified_diff("a\nx\n", "a\nx", "f");
        assert_eq!(
            diff,
            "--- a/f\n+++ b/f\n@@ -1,2 +1,2 @@\n a\n-x\n+x\n\\ No newline at end of file\n"
        );
    }

    #[test]
    fn line_endings_are_significant() {
        let lines = diff_lines("a\r\n", "a\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].kind, DiffKind::Remove);
        assert_eq!(lines[0].content, "a\r");
        assert_eq!(lines[1].content, "a");
    }

    #[test]
    fn format_diff_prefixes_lines() {
        let rendered = format_diff(&diff_lines("a\nb\n", "a\nc\n"));
        assert_eq!(rendered, "  a\n- b\n+ c\n");
    }
}
