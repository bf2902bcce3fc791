//! Pluggable tool system.
//!
//! Tools are async trait objects the model can invoke during the agentic
//! loop. Each tool provides its own OpenAI function definition and an async
//! execute method taking already-parsed JSON arguments.
//!
//! Failure handling is deliberately asymmetric: argument and execution
//! failures become result strings the model can read and correct, while an
//! unknown tool name is a hard dispatch error that aborts the run.

pub mod files;
pub mod search;
pub mod shell;

use crate::error::{AgentError, ToolError};
use crate::types::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

// ---------------------------------------------------------------------------
// Tool trait
// ---------------------------------------------------------------------------

/// A tool that can be invoked by the model.
///
/// Implement this trait to add custom tools. Register instances with
/// [`ToolRegistry`] before starting the agent loop. Recoverable failures
/// should be `Err` values; the registry turns them into result strings so
/// the model stays in the control loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name matching what the model will call.
    fn name(&self) -> &'static str;

    /// OpenAI-format tool definition for inclusion in API requests.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with parsed JSON arguments.
    /// Returns a text result to send back to the model.
    async fn execute(&self, args: &Value) -> Result<String, ToolError>;
}

// ---------------------------------------------------------------------------
// Tool registry
// ---------------------------------------------------------------------------

/// Registry of available tools.
///
/// The agent sends all registered tool definitions to the API in
/// registration order and dispatches tool calls through this registry.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique within the registry.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), ToolError> {
        if self.has_tool(tool.name()) {
            return Err(ToolError::DuplicateName(tool.name().to_string()));
        }
        self.tools.push(Box::new(tool));
        Ok(())
    }

    /// Get tool definitions for the API request, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Dispatch one tool call.
    ///
    /// `arguments` is the raw string produced by the model. Invalid JSON and
    /// tool failures are recovered into `"Error: ..."` result strings; only
    /// an unregistered name is a hard error.
    pub async fn execute(&self, name: &str, arguments: &str) -> Result<String, AgentError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;

        let parsed: Value = match serde_json::from_str(arguments) {
            Ok(value) => value,
            Err(err) => {
                debug!(tool = name, %err, "tool arguments are not valid JSON");
                return Ok(format!("Error: Invalid JSON arguments: {arguments}"));
            }
        };

        match tool.execute(&parsed).await {
            Ok(output) => Ok(output),
            Err(err) => Ok(format!("Error: {err}")),
        }
    }

    /// True if no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// True when a tool with the given name is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|tool| tool.name() == name)
    }
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

/// Names of every built-in tool, in registration order.
pub const BUILTIN_TOOL_NAMES: [&str; 6] = ["read", "write", "edit", "glob", "grep", "bash"];

/// Build a registry holding the built-in tools.
///
/// `filter` limits the set by name; an empty filter means every built-in.
/// Unknown names in the filter are rejected so controller typos surface
/// at init instead of mid-conversation.
pub fn builtin_registry(filter: &[String]) -> Result<ToolRegistry, ToolError> {
    for name in filter {
        if !BUILTIN_TOOL_NAMES.contains(&name.as_str()) {
            return Err(ToolError::InvalidArguments(format!(
                "unknown tool in filter: {name}"
            )));
        }
    }
    let wanted = |name: &str| filter.is_empty() || filter.iter().any(|f| f == name);

    let mut registry = ToolRegistry::new();
    if wanted("read") {
        registry.register(files::ReadTool)?;
    }
    if wanted("write") {
        registry.register(files::WriteTool)?;
    }
    if wanted("edit") {
        registry.register(files::EditTool)?;
    }
    if wanted("glob") {
        registry.register(search::GlobTool)?;
    }
    if wanted("grep") {
        registry.register(search::GrepTool)?;
    }
    if wanted("bash") {
        registry.register(shell::BashTool)?;
    }
    Ok(registry)
}
