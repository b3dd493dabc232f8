//! Tool schemas and implementations.
//!
//! [`dispatch::ToolDispatcher`] is the only entry point the model loop needs:
//! it routes a tool name plus JSON arguments to the implementations in
//! [`files`], [`search`] and [`todo`], or to the shell manager and sub-agent
//! scheduler, and always answers with a [`crate::session::ToolResult`].

pub mod dispatch;
pub mod files;
pub mod search;
pub mod todo;

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Value, json};

pub use dispatch::ToolDispatcher;

pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const EDIT_FILE: &str = "edit_file";
pub const GLOB_FILES: &str = "glob_files";
pub const GREP_SEARCH: &str = "grep_search";
pub const BASH: &str = "bash";
pub const BASH_OUTPUT: &str = "bash_output";
pub const KILL_SHELL: &str = "kill_shell";
pub const TASK: &str = "task";
pub const WAIT_SUBAGENTS: &str = "wait_subagents";
pub const TASK_RESULT: &str = "task_result";
pub const TODO_WRITE: &str = "todo_write";

/// JSON-schema description of one tool, in the shape model APIs expect.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

impl ToolDefinition {
    fn new(name: &'static str, description: &'static str, parameters: Value) -> Self {
        Self {
            name,
            description,
            parameters,
        }
    }
}

/// Resolve `path` against the workspace. Absolute paths are used as-is.
pub(crate) fn resolve_path(workspace: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        workspace.join(p)
    }
}

/// Schemas of every tool the dispatcher understands.
pub fn define_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            READ_FILE,
            "Read a file and return its lines in `cat -n` format (1-indexed line numbers). \
             Long lines are truncated; use offset/limit to page through large files.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "Absolute path or path relative to the workspace"},
                    "offset": {"type": "integer", "description": "1-indexed line to start from (default 1)"},
                    "limit": {"type": "integer", "description": "Number of lines to read (default 2000)"}
                },
                "required": ["file_path"]
            }),
        ),
        ToolDefinition::new(
            WRITE_FILE,
            "Create or overwrite a file. Parent directories are created automatically.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "Absolute path or path relative to the workspace"},
                    "content": {"type": "string", "description": "Complete new file content"}
                },
                "required": ["file_path", "content"]
            }),
        ),
        ToolDefinition::new(
            EDIT_FILE,
            "Replace old_string with new_string in a file. old_string must match exactly \
             (indentation differences between tabs and spaces are tolerated) and must be \
             unique unless replace_all is set. Returns a unified diff of the change.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string", "description": "Absolute path or path relative to the workspace"},
                    "old_string": {"type": "string", "description": "Text to replace"},
                    "new_string": {"type": "string", "description": "Replacement text; must differ from old_string"},
                    "replace_all": {"type": "boolean", "description": "Replace every occurrence (default false)"}
                },
                "required": ["file_path", "old_string", "new_string"]
            }),
        ),
        ToolDefinition::new(
            GLOB_FILES,
            "Find files matching a glob pattern such as `**/*.rs` or `src/**/*.{ts,tsx}`. \
             VCS and build directories are skipped; results are sorted newest first.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "Glob pattern relative to the search path"},
                    "path": {"type": "string", "description": "Directory to search (default: workspace)"}
                },
                "required": ["pattern"]
            }),
        ),
        ToolDefinition::new(
            GREP_SEARCH,
            "Search file contents with a regular expression.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "Regular expression"},
                    "path": {"type": "string", "description": "File or directory to search (default: workspace)"},
                    "glob": {"type": "string", "description": "Only search files matching this glob, e.g. `*.rs`"},
                    "output_mode": {
                        "type": "string",
                        "enum": ["content", "files_with_matches", "count"],
                        "description": "content: matching lines; files_with_matches: paths (default); count: matches per file"
                    },
                    "case_insensitive": {"type": "boolean", "description": "Ignore case (default false)"},
                    "head_limit": {"type": "integer", "description": "Return at most this many result lines"}
                },
                "required": ["pattern"]
            }),
        ),
        ToolDefinition::new(
            BASH,
            "Run a shell command in the workspace. Output is stdout followed by stderr. \
             Set run_in_background for long-running commands and poll with bash_output.",
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "Command passed to `sh -c`"},
                    "timeout": {"type": "integer", "description": "Timeout in milliseconds (default 120000, max 600000)"},
                    "description": {"type": "string", "description": "Short (5-10 word) description of the command"},
                    "run_in_background": {"type": "boolean", "description": "Start the command in the background and return its shell id"}
                },
                "required": ["command"]
            }),
        ),
        ToolDefinition::new(
            BASH_OUTPUT,
            "Read the output of a background shell, optionally keeping only lines that match a regex.",
            json!({
                "type": "object",
                "properties": {
                    "bash_id": {"type": "string", "description": "Shell id returned by bash"},
                    "filter_pattern": {"type": "string", "description": "Regex applied per output line"}
                },
                "required": ["bash_id"]
            }),
        ),
        ToolDefinition::new(
            KILL_SHELL,
            "Terminate a background shell and forget it.",
            json!({
                "type": "object",
                "properties": {
                    "shell_id": {"type": "string", "description": "Shell id returned by bash"}
                },
                "required": ["shell_id"]
            }),
        ),
        ToolDefinition::new(
            TASK,
            "Delegate a self-contained task to a sub-agent. With wait=false the task runs \
             in the background; collect results with wait_subagents.",
            json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string", "description": "Detailed instructions for the sub-agent"},
                    "description": {"type": "string", "description": "Short (3-5 word) label"},
                    "subagent_type": {"type": "string", "description": "Agent type (default general-purpose)"},
                    "wait": {"type": "boolean", "description": "Wait for the result (default true)"}
                },
                "required": ["prompt", "description"]
            }),
        ),
        ToolDefinition::new(
            WAIT_SUBAGENTS,
            "Wait for every background sub-agent to finish and summarize all results.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDefinition::new(
            TASK_RESULT,
            "Show the status and result of one sub-agent task.",
            json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string", "description": "Task id returned by task"}
                },
                "required": ["task_id"]
            }),
        ),
        ToolDefinition::new(
            TODO_WRITE,
            "Replace the session todo list.",
            json!({
                "type": "object",
                "properties": {
                    "todos": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "content": {"type": "string", "description": "Imperative form, e.g. \"Run tests\""},
                                "status": {"type": "string", "enum": ["pending", "in_progress", "completed"]},
                                "activeForm": {"type": "string", "description": "Present continuous form, e.g. \"Running tests\""}
                            },
                            "required": ["content", "status"]
                        }
                    }
                },
                "required": ["todos"]
            }),
        ),
    ]
}
