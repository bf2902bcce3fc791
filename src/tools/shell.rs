//! Shell command execution tool.
//!
//! Runs a command via `sh -c` and returns stdout/stderr/exit code.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;

use super::Tool;
use crate::error::ToolError;
use crate::textutil::truncate_with_suffix_by_bytes;
use crate::types::{FunctionDefinition, ToolDefinition};

/// Maximum bytes of command output to return per stream.
const MAX_OUTPUT_LEN: usize = 4000;
/// Upper bound on command runtime.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Tool that runs shell commands and returns their output.
pub struct BashTool;

#[derive(Deserialize)]
struct Args {
    command: String,
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &'static str {
        "bash"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: self.name().into(),
                description: "Run a shell command and return its output (stdout, stderr, exit code). Commands are killed after 120 seconds.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "command": {
                            "type": "string",
                            "description": "The shell command to execute"
                        }
                    },
                    "required": ["command"]
                }),
            },
        }
    }

    async fn execute(&self, args: &Value) -> Result<String, ToolError> {
        let args: Args =
            serde_json::from_value(args.clone()).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let output = tokio::time::timeout(
            COMMAND_TIMEOUT,
            Command::new("sh").arg("-c").arg(&args.command).output(),
        )
        .await
        .map_err(|_| {
            ToolError::ExecutionFailed(format!(
                "command timed out after {}s",
                COMMAND_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);

        let mut sections = Vec::new();
        if !stdout.trim().is_empty() {
            sections.push(format!(
                "stdout:\n{}",
                truncate_with_suffix_by_bytes(&stdout, MAX_OUTPUT_LEN, "...[truncated]")
            ));
        }
        if !stderr.trim().is_empty() {
            sections.push(format!(
                "stderr:\n{}",
                truncate_with_suffix_by_bytes(&stderr, MAX_OUTPUT_LEN, "...[truncated]")
            ));
        }
        sections.push(format!("exit code: {exit_code}"));
        Ok(sections.join("\n"))
    }
}
