//! Wire schema for the headless worker.
//!
//! One JSON value per line, `snake_case` field names, discriminated by
//! `type` (requests/responses) or `event` (worker events). Unknown fields
//! are ignored on decode so controllers can evolve independently.

use crate::types::Usage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Controller-originated requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    Init {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        protocol_version: Option<String>,
        #[serde(default)]
        config: InitConfig,
    },
    Send {
        id: String,
        message: String,
    },
    Status {
        id: String,
    },
    Shutdown {
        id: String,
    },
    Cancel {
        id: String,
        target_id: String,
    },
}

impl IpcRequest {
    /// Correlation id carried by every request.
    pub fn id(&self) -> &str {
        match self {
            Self::Init { id, .. }
            | Self::Send { id, .. }
            | Self::Status { id }
            | Self::Shutdown { id }
            | Self::Cancel { id, .. } => id,
        }
    }
}

/// Session parameters carried by `init`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InitConfig {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub tools: Option<Vec<String>>,
    pub max_iterations: Option<usize>,
    pub cwd: Option<String>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Worker-originated responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    InitOk {
        id: String,
        session_id: String,
        protocol_version: String,
    },
    Event {
        event: WorkerEvent,
    },
    Result(SendResult),
    StatusOk {
        id: String,
        model: String,
        messages_count: usize,
        session_id: String,
        active: bool,
    },
    ShutdownOk {
        id: String,
    },
}

/// Terminal record closing a `send` (and carrying every protocol error).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendResult {
    pub id: String,
    /// `"ok"` or `"error"`.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default)]
    pub tool_calls_made: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub iterations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One tool invocation recorded for the terminal result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    pub name: String,
    /// Parsed JSON arguments, `{}` when the raw string did not parse.
    pub args: Value,
}

impl IpcResponse {
    /// Build an error `result` with empty aggregates.
    pub fn error_result(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Result(SendResult {
            id: id.into(),
            status: "error".to_string(),
            response: None,
            tool_calls_made: Vec::new(),
            usage: None,
            iterations: 0,
            error: Some(error.into()),
        })
    }
}

// ---------------------------------------------------------------------------
// Worker events
// ---------------------------------------------------------------------------

/// Protocol-level event wrapping one agent event for the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    ContentDelta {
        text: String,
    },
    ToolStart {
        name: String,
        args: Value,
    },
    ToolEnd {
        name: String,
        /// At most 500 characters of the tool result.
        result_preview: String,
    },
    Usage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Verifies requests decode from their snake_case wire form.
    #[test]
    fn requests_decode_from_wire_form() {
        let init: IpcRequest = serde_json::from_str(
            r#"{"type":"init","id":"1","protocol_version":"0.1.0","config":{"model":"m","tools":["read"]}}"#,
        )
        .unwrap();
        match init {
            IpcRequest::Init {
                id,
                protocol_version,
                config,
            } => {
                assert_eq!(id, "1");
                assert_eq!(protocol_version.as_deref(), Some("0.1.0"));
                assert_eq!(config.model.as_deref(), Some("m"));
                assert_eq!(config.tools, Some(vec!["read".to_string()]));
            }
            other => panic!("unexpected request: {other:?}"),
        }

        let cancel: IpcRequest =
            serde_json::from_str(r#"{"type":"cancel","id":"9","target_id":"2"}"#).unwrap();
        assert_eq!(cancel.id(), "9");
    }

    // Verifies unknown fields are ignored on decode.
    #[test]
    fn unknown_request_fields_are_ignored() {
        let request: IpcRequest = serde_json::from_str(
            r#"{"type":"status","id":"1","future_flag":true}"#,
        )
        .unwrap();
        assert_eq!(request, IpcRequest::Status { id: "1".to_string() });
    }

    // Verifies responses encode with their discriminator and omit empty
    // optional fields.
    #[test]
    fn responses_encode_compactly() {
        let response = IpcResponse::error_result("2", "cancelled");
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["type"], json!("result"));
        assert_eq!(encoded["status"], json!("error"));
        assert_eq!(encoded["error"], json!("cancelled"));
        assert_eq!(encoded["tool_calls_made"], json!([]));
        assert_eq!(encoded["iterations"], json!(0));
        assert!(encoded.get("response").is_none());
        assert!(encoded.get("usage").is_none());
    }

    // Verifies worker events use the `event` discriminator.
    #[test]
    fn worker_events_use_event_discriminator() {
        let event = WorkerEvent::ToolStart {
            name: "read".to_string(),
            args: json!({"path": "x"}),
        };
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["event"], json!("tool_start"));
        assert_eq!(encoded["args"]["path"], json!("x"));

        let error = WorkerEvent::Error {
            error: "Provider error".to_string(),
            code: Some("provider_error".to_string()),
            provider: None,
            details: None,
        };
        let encoded = serde_json::to_value(&error).unwrap();
        assert!(encoded.get("provider").is_none());
        assert!(encoded.get("details").is_none());
    }
}
