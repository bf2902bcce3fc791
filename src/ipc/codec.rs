//! Line codec for the worker protocol.
//!
//! Decoding is two-stage: the line parses to a JSON value first so shape
//! problems produce terse, stable error strings, then converts to the typed
//! request. Encoding is compact JSON without a trailing newline; the writer
//! adds the `\n`.

use super::protocol::{IpcRequest, IpcResponse};
use serde_json::Value;

/// A line the codec could not turn into a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// Request id, when the line got far enough to carry one.
    pub id: Option<String>,
    /// Terse description for the error result.
    pub message: String,
}

impl DecodeError {
    fn new(id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
        }
    }
}

const KNOWN_TYPES: [&str; 5] = ["init", "send", "status", "shutdown", "cancel"];

/// Decode one input line into a request.
pub fn decode_request(line: &str) -> Result<IpcRequest, DecodeError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|_| DecodeError::new(None, "Invalid JSON"))?;
    let Some(object) = value.as_object() else {
        return Err(DecodeError::new(None, "Expected JSON object"));
    };

    let Some(request_type) = object.get("type").and_then(Value::as_str) else {
        return Err(DecodeError::new(None, "Missing 'type' field"));
    };
    let id = object.get("id").and_then(Value::as_str).map(str::to_string);
    if id.is_none() {
        return Err(DecodeError::new(None, "Missing 'id' field"));
    }

    if !KNOWN_TYPES.contains(&request_type) {
        return Err(DecodeError::new(
            id,
            format!("Unknown request type: {request_type}"),
        ));
    }

    let request_type = request_type.to_string();
    serde_json::from_value::<IpcRequest>(value).map_err(|err| {
        DecodeError::new(id, format!("Invalid '{request_type}' request: {err}"))
    })
}

/// Encode one response as a single compact JSON line (no trailing newline).
pub fn encode_response(response: &IpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|_| {
        // Responses are plain data; serialization cannot realistically fail,
        // but the protocol surface must stay total.
        r#"{"type":"result","id":"unknown","status":"error","tool_calls_made":[],"iterations":0,"error":"encoding failure"}"#
            .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_well_formed_requests() {
        let request = decode_request(r#"{"type":"shutdown","id":"7"}"#).unwrap();
        assert_eq!(request, IpcRequest::Shutdown { id: "7".to_string() });
    }

    // Verifies each malformed shape produces its terse error string.
    #[test]
    fn malformed_lines_produce_terse_errors() {
        assert_eq!(
            decode_request("{not json").unwrap_err().message,
            "Invalid JSON"
        );
        assert_eq!(
            decode_request("[1,2,3]").unwrap_err().message,
            "Expected JSON object"
        );
        assert_eq!(
            decode_request(r#"{"id":"1"}"#).unwrap_err().message,
            "Missing 'type' field"
        );
        assert_eq!(
            decode_request(r#"{"type":"send"}"#).unwrap_err().message,
            "Missing 'id' field"
        );
    }

    // Verifies unknown types keep the id so the worker can respond to it.
    #[test]
    fn unknown_type_keeps_request_id() {
        let err = decode_request(r#"{"type":"frobnicate","id":"4"}"#).unwrap_err();
        assert_eq!(err.id.as_deref(), Some("4"));
        assert_eq!(err.message, "Unknown request type: frobnicate");
    }

    // Verifies a known type with missing fields reports the id and type.
    #[test]
    fn field_errors_name_the_request_type() {
        let err = decode_request(r#"{"type":"send","id":"2"}"#).unwrap_err();
        assert_eq!(err.id.as_deref(), Some("2"));
        assert!(err.message.starts_with("Invalid 'send' request:"), "got: {}", err.message);
    }

    #[test]
    fn encode_is_compact_without_newline() {
        let line = encode_response(&IpcResponse::ShutdownOk { id: "1".to_string() });
        assert_eq!(line, r#"{"type":"shutdown_ok","id":"1"}"#);
        assert!(!line.ends_with('\n'));
    }
}
