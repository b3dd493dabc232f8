//! File discovery and content search.
//!
//! Both searches walk the tree with `walkdir`, pruning VCS, dependency and
//! build directories, and run on the blocking pool.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use globset::{GlobBuilder, GlobMatcher};
use regex::RegexBuilder;
use serde::Deserialize;
use walkdir::{DirEntry, WalkDir};

use crate::error::ToolError;
use crate::exec::truncate_output;

const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    "dist",
    "build",
    "target",
];

/// Bytes inspected when deciding whether a file is binary.
const BINARY_SNIFF_BYTES: usize = 8192;

/// What `grep_search` reports per hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// `path:line:text` for every matching line.
    Content,
    /// Paths of files with at least one match.
    #[default]
    FilesWithMatches,
    /// `path:count` per matching file.
    Count,
}

/// Parameters of one content search.
#[derive(Debug, Clone)]
pub struct GrepOptions {
    pub pattern: String,
    pub root: PathBuf,
    pub glob: Option<String>,
    pub output_mode: OutputMode,
    pub case_insensitive: bool,
    pub head_limit: Option<usize>,
    pub max_output_chars: usize,
}

/// Files under `root` matching `pattern`, newest first, displayed relative to
/// `workspace` where possible.
pub async fn glob_files(workspace: &Path, root: PathBuf, pattern: &str) -> Result<String, ToolError> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| ToolError::InvalidInput(format!("Invalid glob pattern: {e}")))?
        .compile_matcher();
    let workspace = workspace.to_path_buf();
    let pattern = pattern.to_string();

    tokio::task::spawn_blocking(move || glob_blocking(&workspace, &root, &matcher, &pattern))
        .await
        .map_err(|e| ToolError::Internal(format!("glob task failed: {e}")))?
}

fn glob_blocking(
    workspace: &Path,
    root: &Path,
    matcher: &GlobMatcher,
    pattern: &str,
) -> Result<String, ToolError> {
    if !root.exists() {
        return Err(ToolError::NotFound(format!("Path not found: {}", root.display())));
    }

    let mut hits: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in walk(root) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if matcher.is_match(rel) {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            hits.push((modified, entry.into_path()));
        }
    }

    if hits.is_empty() {
        return Ok(format!("No files matching '{pattern}'"));
    }

    hits.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    Ok(hits
        .iter()
        .map(|(_, path)| display_path(workspace, path))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Regex search over file contents.
pub async fn grep_search(workspace: &Path, options: GrepOptions) -> Result<String, ToolError> {
    let workspace = workspace.to_path_buf();
    tokio::task::spawn_blocking(move || grep_blocking(&workspace, &options))
        .await
        .map_err(|e| ToolError::Internal(format!("search task failed: {e}")))?
}

fn grep_blocking(workspace: &Path, options: &GrepOptions) -> Result<String, ToolError> {
    let regex = RegexBuilder::new(&options.pattern)
        .case_insensitive(options.case_insensitive)
        .build()
        .map_err(|e| ToolError::InvalidInput(format!("Invalid regex: {e}")))?;

    let file_glob = options
        .glob
        .as_deref()
        .map(|g| {
            GlobBuilder::new(g)
                .build()
                .map(|g| g.compile_matcher())
                .map_err(|e| ToolError::InvalidInput(format!("Invalid glob pattern: {e}")))
        })
        .transpose()?;

    let root = &options.root;
    if !root.exists() {
        return Err(ToolError::NotFound(format!("Path not found: {}", root.display())));
    }

    let mut results: Vec<String> = Vec::new();
    for entry in walk(root) {
        if !entry.file_type().is_file() {
            continue;
        }

        if let Some(glob) = &file_glob {
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if !glob.is_match(rel) && !glob.is_match(entry.file_name()) {
                continue;
            }
        }

        let Ok(bytes) = std::fs::read(entry.path()) else {
            continue;
        };
        if bytes[..bytes.len().min(BINARY_SNIFF_BYTES)].contains(&0) {
            continue;
        }
        let text = String::from_utf8_lossy(&bytes);
        let shown = display_path(workspace, entry.path());

        match options.output_mode {
            OutputMode::FilesWithMatches => {
                if regex.is_match(&text) {
                    results.push(shown);
                }
            }
            OutputMode::Count => {
                let count = regex.find_iter(&text).count();
                if count > 0 {
                    results.push(format!("{shown}:{count}"));
                }
            }
            OutputMode::Content => {
                for (idx, line) in text.lines().enumerate() {
                    if regex.is_match(line) {
                        results.push(format!("{shown}:{}:{}", idx + 1, line.trim()));
                    }
                }
            }
        }

        if options.head_limit.is_some_and(|limit| results.len() >= limit) {
            break;
        }
    }

    if results.is_empty() {
        return Ok(format!("No matches for '{}'", options.pattern));
    }
    if let Some(limit) = options.head_limit.filter(|l| *l > 0) {
        results.truncate(limit);
    }

    Ok(truncate_output(&results.join("\n"), options.max_output_chars))
}

/// Walk `root` in name order, never descending into skipped directories.
fn walk(root: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() > 0
                && e.file_type().is_dir()
                && SKIP_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        })
        .filter_map(Result::ok)
}

fn display_path(workspace: &Path, path: &Path) -> String {
    path.strip_prefix(workspace)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {\n    run();\n}\n").unwrap();
        fs::write(root.join("src/nested/util.rs"), "pub fn run() {}\npub fn RUN_twice() {}\n").unwrap();
        fs::write(root.join("node_modules/pkg/index.rs"), "fn run() {}\n").unwrap();
        fs::write(root.join(".git/config.rs"), "run\n").unwrap();
        fs::write(root.join("README.md"), "run the thing\n").unwrap();
        fs::write(root.join("blob.bin"), b"run\0\x01").unwrap();
        tmp
    }

    fn grep(root: &Path, pattern: &str, mode: OutputMode) -> GrepOptions {
        GrepOptions {
            pattern: pattern.to_string(),
            root: root.to_path_buf(),
            glob: None,
            output_mode: mode,
            case_insensitive: false,
            head_limit: None,
            max_output_chars: 30_000,
        }
    }

    #[tokio::test]
    async fn glob_recurses_and_skips_ignored_dirs() {
        let tmp = tree();
        let out = glob_files(tmp.path(), tmp.path().to_path_buf(), "**/*.rs").await.unwrap();
        let mut files: Vec<_> = out.lines().collect();
        files.sort_unstable();
        assert_eq!(files, vec!["src/main.rs", "src/nested/util.rs"]);
    }

    #[tokio::test]
    async fn glob_star_does_not_cross_directories() {
        let tmp = tree();
        let out = glob_files(tmp.path(), tmp.path().to_path_buf(), "*.md").await.unwrap();
        assert_eq!(out, "README.md");
    }

    #[tokio::test]
    async fn glob_reports_no_matches() {
        let tmp = tree();
        let out = glob_files(tmp.path(), tmp.path().to_path_buf(), "**/*.py").await.unwrap();
        assert_eq!(out, "No files matching '**/*.py'");
    }

    #[tokio::test]
    async fn glob_missing_root_is_not_found() {
        let tmp = tree();
        let err = glob_files(tmp.path(), tmp.path().join("missing"), "*").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn grep_files_with_matches_skips_binary_and_ignored() {
        let tmp = tree();
        let out = grep_search(tmp.path(), grep(tmp.path(), "run", OutputMode::FilesWithMatches))
            .await
            .unwrap();
        assert_eq!(out, "README.md\nsrc/main.rs\nsrc/nested/util.rs");
    }

    #[tokio::test]
    async fn grep_content_mode_reports_lines() {
        let tmp = tree();
        let mut opts = grep(tmp.path(), r"run\(\)", OutputMode::Content);
        opts.glob = Some("*.rs".to_string());
        let out = grep_search(tmp.path(), opts).await.unwrap();
        assert_eq!(out, "src/main.rs:2:run();\nsrc/nested/util.rs:1:pub fn run() {}");
    }

    #[tokio::test]
    async fn grep_count_mode_case_insensitive() {
        let tmp = tree();
        let mut opts = grep(&tmp.path().join("src/nested"), "run", OutputMode::Count);
        opts.case_insensitive = true;
        let out = grep_search(tmp.path(), opts).await.unwrap();
        assert_eq!(out, "src/nested/util.rs:2");
    }

    #[tokio::test]
    async fn grep_head_limit() {
        let tmp = tree();
        let mut opts = grep(tmp.path(), "run", OutputMode::FilesWithMatches);
        opts.head_limit = Some(1);
        let out = grep_search(tmp.path(), opts).await.unwrap();
        assert_eq!(out, "README.md");
    }

    #[tokio::test]
    async fn grep_invalid_regex() {
        let tmp = tree();
        let err = grep_search(tmp.path(), grep(tmp.path(), "(", OutputMode::Content))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[test]
    fn output_mode_parses_snake_case() {
        let mode: OutputMode = serde_json::from_value(serde_json::json!("files_with_matches")).unwrap();
        assert_eq!(mode, OutputMode::FilesWithMatches);
    }
}
