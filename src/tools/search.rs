//! Filesystem search tools.
//!
//! - `glob`: match file paths under a root against a glob pattern.
//! - `grep`: regex search across file contents under a root.
//!
//! Both walk the tree themselves and bound their output; hidden entries
//! (dotfiles, `.git`) are skipped.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::Tool;
use crate::error::ToolError;
use crate::types::{FunctionDefinition, ToolDefinition};

/// Maximum matches either tool reports.
const MAX_RESULTS: usize = 200;

fn parse_args<T: for<'de> Deserialize<'de>>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Collect regular files under `root`, depth-first, skipping hidden entries.
fn walk_files(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            walk_files(&path, out);
        } else if file_type.is_file() {
            out.push(path);
        }
    }
}

/// Compile a glob pattern (`*`, `**`, `?`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex, ToolError> {
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // `**/` also matches zero directories.
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        regex.push_str("(?:.*/)?");
                    } else {
                        regex.push_str(".*");
                    }
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex).map_err(|e| ToolError::InvalidArguments(format!("bad pattern: {e}")))
}

// ---------------------------------------------------------------------------
// glob
// ---------------------------------------------------------------------------

/// Tool that lists files matching a glob pattern.
pub struct GlobTool;

#[derive(Deserialize)]
struct GlobArgs {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &'static str {
        "glob"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: self.name().into(),
                description: "Find files whose relative path matches a glob pattern (supports *, ** and ?).".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "pattern": {
                            "type": "string",
                            "description": "Glob pattern, e.g. src/**/*.rs"
                        },
                        "path": {
                            "type": "string",
                            "description": "Directory to search (default: current directory)"
                        }
                    },
                    "required": ["pattern"]
                }),
            },
        }
    }

    async fn execute(&self, args: &Value) -> Result<String, ToolError> {
        let args: GlobArgs = parse_args(args)?;
        let root = PathBuf::from(args.path.as_deref().unwrap_or("."));
        let matcher = glob_to_regex(&args.pattern)?;

        let mut files = Vec::new();
        walk_files(&root, &mut files);

        let mut matched = Vec::new();
        for path in files {
            let Ok(relative) = path.strip_prefix(&root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if matcher.is_match(&relative) {
                matched.push(relative.to_string());
                if matched.len() >= MAX_RESULTS {
                    break;
                }
            }
        }

        if matched.is_empty() {
            return Ok("No files matched.".to_string());
        }
        let mut output = matched.join("\n");
        if matched.len() >= MAX_RESULTS {
            output.push_str("\n...[result limit reached]");
        }
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// grep
// ---------------------------------------------------------------------------

/// Tool that searches file contents with a regex.
pub struct GrepTool;

#[derive(Deserialize)]
struct GrepArgs {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &'static str {
        "grep"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: self.name().into(),
                description: "Search file contents under a directory with a regular expression; reports path:line: text matches.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "pattern": {
                            "type": "string",
                            "description": "Regular expression to search for"
                        },
                        "path": {
                            "type": "string",
                            "description": "Directory to search (default: current directory)"
                        }
                    },
                    "required": ["pattern"]
                }),
            },
        }
    }

    async fn execute(&self, args: &Value) -> Result<String, ToolError> {
        let args: GrepArgs = parse_args(args)?;
        let matcher = Regex::new(&args.pattern)
            .map_err(|e| ToolError::InvalidArguments(format!("bad pattern: {e}")))?;
        let root = PathBuf::from(args.path.as_deref().unwrap_or("."));

        let mut files = Vec::new();
        walk_files(&root, &mut files);

        let mut matches = Vec::new();
        'files: for path in files {
            // Binary and non-UTF-8 files are skipped, not errors.
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            for (line_no, line) in content.lines().enumerate() {
                if matcher.is_match(line) {
                    let shown = path
                        .strip_prefix(&root)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .replace('\\', "/");
                    matches.push(format!("{shown}:{}: {line}", line_no + 1));
                    if matches.len() >= MAX_RESULTS {
                        break 'files;
                    }
                }
            }
        }

        if matches.is_empty() {
            return Ok("No matches found.".to_string());
        }
        let mut output = matches.join("\n");
        if matches.len() >= MAX_RESULTS {
            output.push_str("\n...[result limit reached]");
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::TestTempDir;
    use serde_json::json;

    fn fixture_tree() -> TestTempDir {
        let fixture = TestTempDir::new("search");
        fixture.write_text("src/lib.rs", "pub fn alpha() {}\n");
        fixture.write_text("src/nested/mod.rs", "pub fn beta() {}\n");
        fixture.write_text("README.md", "alpha and beta\n");
        fixture.write_text(".hidden/secret.rs", "pub fn hidden() {}\n");
        fixture
    }

    // Verifies glob translation semantics for *, ** and ?.
    #[test]
    fn glob_to_regex_semantics() {
        let rx = glob_to_regex("src/**/*.rs").unwrap();
        assert!(rx.is_match("src/lib.rs"));
        assert!(rx.is_match("src/nested/mod.rs"));
        assert!(!rx.is_match("README.md"));

        let rx = glob_to_regex("*.rs").unwrap();
        assert!(rx.is_match("lib.rs"));
        assert!(!rx.is_match("src/lib.rs"));

        let rx = glob_to_regex("file.?s").unwrap();
        assert!(rx.is_match("file.rs"));
        assert!(!rx.is_match("file.s"));
    }

    #[tokio::test]
    async fn glob_matches_relative_paths_and_skips_hidden() {
        let fixture = fixture_tree();
        let out = GlobTool
            .execute(&json!({
                "pattern": "**/*.rs",
                "path": fixture.path().display().to_string()
            }))
            .await
            .unwrap();
        assert!(out.contains("src/lib.rs"), "got: {out}");
        assert!(out.contains("src/nested/mod.rs"), "got: {out}");
        assert!(!out.contains("secret.rs"), "got: {out}");
    }

    #[tokio::test]
    async fn glob_reports_no_matches() {
        let fixture = fixture_tree();
        let out = GlobTool
            .execute(&json!({
                "pattern": "**/*.zig",
                "path": fixture.path().display().to_string()
            }))
            .await
            .unwrap();
        assert_eq!(out, "No files matched.");
    }

    #[tokio::test]
    async fn grep_reports_path_line_and_text() {
        let fixture = fixture_tree();
        let out = GrepTool
            .execute(&json!({
                "pattern": "fn beta",
                "path": fixture.path().display().to_string()
            }))
            .await
            .unwrap();
        assert_eq!(out, "src/nested/mod.rs:1: pub fn beta() {}");
    }

    #[tokio::test]
    async fn grep_rejects_invalid_patterns() {
        let err = GrepTool
            .execute(&json!({"pattern": "("}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad pattern"));
    }
}
