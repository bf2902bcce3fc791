//! Assembly of streamed chunks into a complete assistant message.
//!
//! Tool calls arrive as fragments keyed by a small integer index: the id
//! typically once, the name and arguments split across many chunks. The
//! accumulator concatenates name/argument fragments per index and keeps the
//! last non-empty id (last writer wins).

use crate::types::{ChatChunk, FunctionCall, Message, Role, ToolCall, Usage};
use std::collections::BTreeMap;

/// Per-index partial tool call being accumulated.
#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulator state for one streamed remote call.
#[derive(Debug, Default)]
pub struct StreamAssembly {
    content: String,
    tool_calls: BTreeMap<u32, PartialToolCall>,
    usage: Option<Usage>,
}

impl StreamAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the accumulator.
    ///
    /// Returns the chunk's text fragment when it carried one, so the caller
    /// can emit a content delta without re-inspecting the chunk.
    pub fn absorb(&mut self, chunk: &ChatChunk) -> Option<String> {
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }
        let choice = chunk.choices.first()?;

        if let Some(fragments) = &choice.delta.tool_calls {
            for fragment in fragments {
                let entry = self.tool_calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id.as_deref().filter(|id| !id.is_empty()) {
                    entry.id = id.to_string();
                }
                if let Some(function) = &fragment.function {
                    if let Some(name) = &function.name {
                        entry.name.push_str(name);
                    }
                    if let Some(arguments) = &function.arguments {
                        entry.arguments.push_str(arguments);
                    }
                }
            }
        }

        let delta = choice.delta.content.clone().filter(|c| !c.is_empty())?;
        self.content.push_str(&delta);
        Some(delta)
    }

    /// Produce the assembled assistant message and the last observed usage.
    pub fn finish(self) -> (Message, Option<Usage>) {
        let content = if self.content.is_empty() {
            None
        } else {
            Some(self.content)
        };
        // BTreeMap iteration is already index-sorted.
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_values()
            .map(|partial| ToolCall {
                id: partial.id,
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: partial.name,
                    arguments: partial.arguments,
                },
            })
            .collect();

        let message = Message {
            role: Role::Assistant,
            content,
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            tool_call_id: None,
            extra: Default::default(),
        };
        (message, self.usage)
    }
}
