//! Per-call request-parameter validation.
//!
//! Controllers can attach arbitrary JSON overrides to a request. Known
//! fields are filtered, never coerced: a value that fails its check is
//! dropped and the rest of the override set still applies. Unknown fields
//! are dropped outright. Every drop leaves a debug note.

use super::JsonObject;
use serde_json::Value;
use tracing::debug;

const REASONING_EFFORTS: [&str; 6] = ["xhigh", "high", "medium", "low", "minimal", "none"];
const REASONING_SUMMARIES: [&str; 3] = ["auto", "concise", "detailed"];
const ROUTES: [&str; 2] = ["fallback", "sort"];
const MAX_SESSION_ID_LEN: usize = 128;

/// Filter an override object down to the fields that pass validation.
pub fn validate_overrides(overrides: &JsonObject) -> JsonObject {
    let mut out = JsonObject::new();
    for (key, value) in overrides {
        match key.as_str() {
            "model" => keep_if(&mut out, key, value, value.is_string()),
            "temperature" => {
                let ok = value
                    .as_f64()
                    .is_some_and(|t| (0.0..=2.0).contains(&t));
                keep_if(&mut out, key, value, ok);
            }
            "max_tokens" => {
                let ok = value.as_u64().is_some_and(|n| n >= 1);
                keep_if(&mut out, key, value, ok);
            }
            "top_p" | "seed" | "frequency_penalty" | "presence_penalty" => {
                keep_if(&mut out, key, value, value.is_number());
            }
            "stop" => {
                let ok = value.is_string()
                    || value
                        .as_array()
                        .is_some_and(|items| items.iter().all(Value::is_string));
                keep_if(&mut out, key, value, ok);
            }
            "route" => {
                let ok = value.as_str().is_some_and(|r| ROUTES.contains(&r));
                keep_if(&mut out, key, value, ok);
            }
            "models" => {
                let ok = value
                    .as_array()
                    .is_some_and(|items| items.iter().all(Value::is_string));
                keep_if(&mut out, key, value, ok);
            }
            "reasoning" => {
                if let Some(reasoning) = value.as_object().map(validate_reasoning) {
                    if reasoning.is_empty() {
                        debug!(field = "reasoning", "dropping override: no valid sub-field");
                    } else {
                        out.insert(key.clone(), Value::Object(reasoning));
                    }
                } else {
                    note_drop(key);
                }
            }
            "session_id" => {
                let ok = value
                    .as_str()
                    .is_some_and(|s| s.len() <= MAX_SESSION_ID_LEN);
                keep_if(&mut out, key, value, ok);
            }
            "response_format" | "provider" | "debug" => {
                keep_if(&mut out, key, value, value.is_object());
            }
            "tool_choice" => {
                keep_if(&mut out, key, value, value.is_string() || value.is_object());
            }
            "plugins" => keep_if(&mut out, key, value, value.is_array()),
            _ => {
                debug!(field = %key, "dropping unknown override field");
            }
        }
    }
    out
}

/// Validate `reasoning` sub-fields, keeping only the ones that pass.
fn validate_reasoning(reasoning: &JsonObject) -> JsonObject {
    let mut out = JsonObject::new();
    for (key, value) in reasoning {
        let ok = match key.as_str() {
            "effort" => value
                .as_str()
                .is_some_and(|e| REASONING_EFFORTS.contains(&e)),
            "max_tokens" => value.as_u64().is_some_and(|n| n >= 1),
            "excluded" => value.is_boolean(),
            "summary" => value
                .as_str()
                .is_some_and(|s| REASONING_SUMMARIES.contains(&s)),
            _ => false,
        };
        if ok {
            out.insert(key.clone(), value.clone());
        } else {
            debug!(field = %format!("reasoning.{key}"), "dropping invalid override field");
        }
    }
    out
}

fn keep_if(out: &mut JsonObject, key: &str, value: &Value, ok: bool) {
    if ok {
        out.insert(key.to_string(), value.clone());
    } else {
        note_drop(key);
    }
}

fn note_drop(key: &str) {
    debug!(field = %key, "dropping invalid override field");
}
