//! Detection of repeated tool-call turns.
//!
//! Each iteration's tool calls reduce to a deterministic fingerprint string.
//! Arguments that parse as JSON are re-printed so whitespace and key-order
//! variation cannot disguise a repeat; unparseable arguments fall back to
//! the raw string.

use crate::types::ToolCall;
use std::collections::VecDeque;

/// Fingerprint one tool call as `"<name>:<normalizedArgs>"`.
pub fn call_fingerprint(call: &ToolCall) -> String {
    let normalized = serde_json::from_str::<serde_json::Value>(&call.function.arguments)
        .map(|value| value.to_string())
        .unwrap_or_else(|_| call.function.arguments.clone());
    format!("{}:{normalized}", call.function.name)
}

/// Fingerprint one iteration's tool calls, preserving call order.
pub fn iteration_fingerprint(calls: &[ToolCall]) -> String {
    calls
        .iter()
        .map(call_fingerprint)
        .collect::<Vec<_>>()
        .join("|")
}

/// Bounded FIFO of the most recent iteration fingerprints.
#[derive(Debug)]
pub struct RecentCallWindow {
    window: VecDeque<String>,
    threshold: usize,
}

impl RecentCallWindow {
    pub fn new(threshold: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(threshold),
            threshold,
        }
    }

    /// Record one iteration fingerprint, evicting the oldest past capacity.
    pub fn push(&mut self, fingerprint: String) {
        self.window.push_back(fingerprint);
        while self.window.len() > self.threshold {
            self.window.pop_front();
        }
    }

    /// True when the window is full and every entry is byte-equal.
    pub fn is_doom_loop(&self) -> bool {
        if self.threshold == 0 || self.window.len() < self.threshold {
            return false;
        }
        let mut entries = self.window.iter();
        let Some(first) = entries.next() else {
            return false;
        };
        entries.all(|entry| entry == first)
    }
}
