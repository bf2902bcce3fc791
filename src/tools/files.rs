//! File read/write/edit tools.
//!
//! - `read`: reads a file's contents (truncated if large).
//! - `write`: writes content to a file, creating parents as needed.
//! - `edit`: exact single replacement of a text span within a file.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::Tool;
use crate::error::ToolError;
use crate::textutil::truncate_with_suffix_by_bytes;
use crate::types::{FunctionDefinition, ToolDefinition};

/// Maximum bytes to return when reading a file.
const MAX_READ_LEN: usize = 8000;

fn parse_args<T: for<'de> Deserialize<'de>>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

// ---------------------------------------------------------------------------
// read
// ---------------------------------------------------------------------------

/// Tool that reads the contents of a file.
pub struct ReadTool;

#[derive(Deserialize)]
struct ReadArgs {
    path: String,
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &'static str {
        "read"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: self.name().into(),
                description: "Read the contents of a file at the given path.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path to the file to read"
                        }
                    },
                    "required": ["path"]
                }),
            },
        }
    }

    async fn execute(&self, args: &Value) -> Result<String, ToolError> {
        let args: ReadArgs = parse_args(args)?;
        let content = tokio::fs::read_to_string(&args.path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("{}: {e}", args.path)))?;

        if content.len() > MAX_READ_LEN {
            Ok(truncate_with_suffix_by_bytes(
                &content,
                MAX_READ_LEN,
                "...[truncated]",
            ))
        } else {
            Ok(content)
        }
    }
}

// ---------------------------------------------------------------------------
// write
// ---------------------------------------------------------------------------

/// Tool that writes content to a file.
pub struct WriteTool;

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &'static str {
        "write"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: self.name().into(),
                description: "Write content to a file at the given path. Creates the file and any missing parent directories, overwrites existing content.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path to the file to write"
                        },
                        "content": {
                            "type": "string",
                            "description": "Content to write to the file"
                        }
                    },
                    "required": ["path", "content"]
                }),
            },
        }
    }

    async fn execute(&self, args: &Value) -> Result<String, ToolError> {
        let args: WriteArgs = parse_args(args)?;
        if let Some(parent) = std::path::Path::new(&args.path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(format!("{}: {e}", args.path)))?;
            }
        }
        tokio::fs::write(&args.path, &args.content)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("{}: {e}", args.path)))?;

        Ok(format!(
            "Wrote {} bytes to {}",
            args.content.len(),
            args.path
        ))
    }
}

// ---------------------------------------------------------------------------
// edit
// ---------------------------------------------------------------------------

/// Tool that replaces one exact text span within a file.
pub struct EditTool;

#[derive(Deserialize)]
struct EditArgs {
    path: String,
    old_text: String,
    new_text: String,
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &'static str {
        "edit"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: self.name().into(),
                description: "Replace an exact text span in a file. old_text must appear exactly once; include surrounding lines to disambiguate.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path to the file to edit"
                        },
                        "old_text": {
                            "type": "string",
                            "description": "Exact text to replace (must match exactly once)"
                        },
                        "new_text": {
                            "type": "string",
                            "description": "Replacement text"
                        }
                    },
                    "required": ["path", "old_text", "new_text"]
                }),
            },
        }
    }

    async fn execute(&self, args: &Value) -> Result<String, ToolError> {
        let args: EditArgs = parse_args(args)?;
        if args.old_text.is_empty() {
            return Err(ToolError::InvalidArguments("old_text is empty".into()));
        }
        let content = tokio::fs::read_to_string(&args.path)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("{}: {e}", args.path)))?;

        let matches = content.matches(&args.old_text).count();
        if matches == 0 {
            return Err(ToolError::ExecutionFailed(format!(
                "old_text not found in {}",
                args.path
            )));
        }
        if matches > 1 {
            return Err(ToolError::ExecutionFailed(format!(
                "old_text matches {matches} times in {}; add surrounding context",
                args.path
            )));
        }

        let updated = content.replacen(&args.old_text, &args.new_text, 1);
        tokio::fs::write(&args.path, &updated)
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("{}: {e}", args.path)))?;
        Ok(format!("Edited {}", args.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::TestTempDir;
    use serde_json::json;

    #[tokio::test]
    async fn read_missing_arguments_is_invalid() {
        let err = ReadTool.execute(&json!({})).await.unwrap_err();
        assert!(err.to_string().contains("invalid arguments"));
    }

    #[tokio::test]
    async fn read_nonexistent_file_fails() {
        let err = ReadTool
            .execute(&json!({"path": "/tmp/heddle_no_such_file_xyz.txt"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("execution failed"));
    }

    #[tokio::test]
    async fn read_returns_contents() {
        let fixture = TestTempDir::new("read");
        let path = fixture.write_text("file.txt", "file content");
        let result = ReadTool
            .execute(&json!({"path": path.display().to_string()}))
            .await
            .unwrap();
        assert_eq!(result, "file content");
    }

    #[tokio::test]
    async fn read_truncates_large_content() {
        let fixture = TestTempDir::new("read-large");
        let path = fixture.write_text("large.txt", &"x".repeat(MAX_READ_LEN + 100));
        let result = ReadTool
            .execute(&json!({"path": path.display().to_string()}))
            .await
            .unwrap();
        assert!(result.ends_with("...[truncated]"), "got: {result}");
    }

    #[tokio::test]
    async fn write_creates_parents_and_reports_bytes() {
        let fixture = TestTempDir::new("write");
        let path = fixture.child("nested/dir/out.txt");
        let result = WriteTool
            .execute(&json!({
                "path": path.display().to_string(),
                "content": "hello write"
            }))
            .await
            .unwrap();
        assert!(result.contains("11 bytes"), "got: {result}");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello write");
    }

    #[tokio::test]
    async fn edit_replaces_exactly_one_match() {
        let fixture = TestTempDir::new("edit");
        let path = fixture.write_text("code.txt", "let x = 1;\nlet y = 2;\n");
        EditTool
            .execute(&json!({
                "path": path.display().to_string(),
                "old_text": "let y = 2;",
                "new_text": "let y = 3;"
            }))
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "let x = 1;\nlet y = 3;\n"
        );
    }

    #[tokio::test]
    async fn edit_rejects_missing_and_ambiguous_spans() {
        let fixture = TestTempDir::new("edit-bad");
        let path = fixture.write_text("code.txt", "a\na\n");

        let err = EditTool
            .execute(&json!({
                "path": path.display().to_string(),
                "old_text": "missing",
                "new_text": "x"
            }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"), "got: {err}");

        let err = EditTool
            .execute(&json!({
                "path": path.display().to_string(),
                "old_text": "a\n",
                "new_text": "b\n"
            }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("matches 2 times"), "got: {err}");
    }
}
