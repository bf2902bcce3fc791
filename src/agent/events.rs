//! Events produced by the agent loop.

use crate::types::{Message, ToolCall, Usage};

/// One step of an agent run, in emission order.
///
/// The stream of these events is the loop's entire observable surface:
/// frontends render them, the headless worker maps them onto its wire
/// protocol, and tests assert on them directly.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A complete assistant turn (assembled, for streaming runs).
    AssistantMessage { message: Message },
    /// Incremental assistant text; streaming runs only.
    ContentDelta { text: String },
    /// A tool is about to execute.
    ToolStart { name: String, call: ToolCall },
    /// A tool finished; `result` is exactly what the model will see.
    ToolEnd {
        name: String,
        result: String,
        call: ToolCall,
    },
    /// Token accounting reported by the provider for the last request.
    Usage { usage: Usage },
    /// The same tool calls repeated `count` consecutive turns; run aborted.
    LoopDetected { count: usize },
    /// Terminal loop-level failure (no choice, iteration cap).
    Error { message: String },
}

impl AgentEvent {
    /// Short label used in debug logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AssistantMessage { .. } => "assistant_message",
            Self::ContentDelta { .. } => "content_delta",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::Usage { .. } => "usage",
            Self::LoopDetected { .. } => "loop_detected",
            Self::Error { .. } => "error",
        }
    }
}
