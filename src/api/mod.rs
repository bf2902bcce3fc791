//! HTTP client for OpenAI-compatible chat-completion APIs.
//!
//! The API layer is split into cohesive modules:
//! - `provider`: request construction, dispatch, and streaming
//! - `overrides`: per-call request-parameter validation
//! - `retry`: bounded retry policy for rate-limited requests
//! - `sse`: incremental framing of `data:`-prefixed event streams

use crate::error::ApiError;
use crate::types::{ChatChunk, ChatResponse, Message, ToolDefinition};
use async_trait::async_trait;
use futures::stream::Stream;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::pin::Pin;
use std::time::SystemTime;

mod overrides;
mod provider;
mod retry;
mod sse;

pub use overrides::validate_overrides;
pub use provider::{Provider, ProviderOptions};
pub use retry::RetryPolicy;
pub use sse::{SseEvent, SseLineDecoder};

/// JSON object alias used for request params and overrides.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Lazy, single-consumer sequence of streamed completion chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, ApiError>> + Send>>;

/// Minimal model API interface used by the agent loop.
///
/// This trait lets tests provide deterministic mock responses without
/// network calls while the production path uses [`Provider`].
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// One buffered completion.
    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        overrides: Option<&JsonObject>,
    ) -> Result<ChatResponse, ApiError>;

    /// One streamed completion. Each call starts a fresh remote request.
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        overrides: Option<&JsonObject>,
    ) -> Result<ChunkStream, ApiError>;
}

/// Parse `Retry-After` response headers into a delay in seconds.
///
/// The header can be either delta-seconds (`120`) or an HTTP-date; a date in
/// the past maps to zero.
pub(crate) fn parse_retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }
    let at = httpdate::parse_http_date(value).ok()?;
    let now = SystemTime::now();
    Some(at.duration_since(now).map(|d| d.as_secs()).unwrap_or(0))
}
