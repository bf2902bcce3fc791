//! Provider client for OpenAI-compatible chat-completion endpoints.

use super::{
    parse_retry_after_secs, validate_overrides, ChunkStream, JsonObject, ModelClient, RetryPolicy,
    SseEvent, SseLineDecoder,
};
use crate::error::ApiError;
use crate::types::{ChatChunk, ChatResponse, Message, ToolDefinition};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::time::sleep;
use tracing::debug;

/// Construction parameters for [`Provider`].
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    pub api_key: String,
    pub model: String,
    /// Endpoint root; defaults to the OpenRouter API.
    pub base_url: Option<String>,
    /// Sticky request parameters merged into every request body.
    pub request_params: Option<JsonObject>,
    /// Retry policy; defaults to three retries with a 1 s base delay.
    /// A policy with `max_retries: 0` disables retrying.
    pub retry: Option<RetryPolicy>,
}

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Client for one OpenAI-compatible endpoint + model pairing.
///
/// The value is cheap to clone; [`Provider::with`] derives a new provider
/// with merged sticky parameters and never mutates the receiver.
#[derive(Clone)]
pub struct Provider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    request_params: JsonObject,
    retry: RetryPolicy,
    /// Vendor label used in error text, derived from the base URL.
    vendor: String,
}

impl Provider {
    /// Build a provider from options.
    pub fn new(options: ProviderOptions) -> Self {
        let base_url = options
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let vendor = vendor_label(&base_url);
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key: options.api_key,
            model: options.model,
            request_params: options.request_params.unwrap_or_default(),
            retry: options.retry.unwrap_or_default(),
            vendor,
        }
    }

    /// Model id this provider sends by default.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Derive a provider whose sticky params are the receiver's merged with
    /// `overrides` (overrides win). The receiver is left unchanged.
    pub fn with(&self, overrides: JsonObject) -> Self {
        let mut derived = self.clone();
        for (key, value) in overrides {
            derived.request_params.insert(key, value);
        }
        derived
    }

    /// Build the request body: base fields, then sticky params, then
    /// validated per-call overrides (later layers win).
    fn build_body(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        overrides: Option<&JsonObject>,
        stream: bool,
    ) -> Result<JsonObject, ApiError> {
        let mut body = JsonObject::new();
        body.insert("model".to_string(), Value::String(self.model.clone()));
        body.insert(
            "messages".to_string(),
            serde_json::to_value(messages)
                .map_err(|e| ApiError::InvalidResponse(format!("request encoding: {e}")))?,
        );
        body.insert("stream".to_string(), Value::Bool(stream));

        for (key, value) in &self.request_params {
            body.insert(key.clone(), value.clone());
        }
        if let Some(overrides) = overrides {
            for (key, value) in validate_overrides(overrides) {
                body.insert(key, value);
            }
        }
        if !tools.is_empty() {
            body.insert(
                "tools".to_string(),
                serde_json::to_value(tools)
                    .map_err(|e| ApiError::InvalidResponse(format!("request encoding: {e}")))?,
            );
        }
        Ok(body)
    }

    /// POST the body and map non-2xx statuses into [`ApiError::Status`].
    async fn post(&self, body: &JsonObject) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after_secs = parse_retry_after_secs(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::status(
                self.vendor.clone(),
                status,
                text,
                retry_after_secs,
            ));
        }
        Ok(response)
    }

    /// POST with the retry policy applied (429 only).
    async fn post_with_retries(&self, body: &JsonObject) -> Result<reqwest::Response, ApiError> {
        let mut attempt: u32 = 0;
        loop {
            match self.post(body).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !self.retry.should_retry(&err, attempt) {
                        return Err(err);
                    }
                    let delay = self.retry.delay_for(attempt, &err);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "rate limited; retrying");
                    attempt = attempt.saturating_add(1);
                    sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl ModelClient for Provider {
    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        overrides: Option<&JsonObject>,
    ) -> Result<ChatResponse, ApiError> {
        let body = self.build_body(messages, tools, overrides, false)?;
        let response = self.post_with_retries(&body).await?;
        response.json::<ChatResponse>().await.map_err(ApiError::from)
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        overrides: Option<&JsonObject>,
    ) -> Result<ChunkStream, ApiError> {
        let body = self.build_body(messages, tools, overrides, true)?;
        let response = self.post_with_retries(&body).await?;
        let mut bytes = response.bytes_stream();

        let stream = try_stream! {
            let mut decoder = SseLineDecoder::new();
            let mut done = false;
            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(ApiError::from)?;
                for event in decoder.feed(&chunk) {
                    match event {
                        SseEvent::Done => {
                            done = true;
                            break 'read;
                        }
                        SseEvent::Data(payload) => {
                            let parsed: ChatChunk =
                                serde_json::from_str(&payload).map_err(|e| {
                                    ApiError::InvalidResponse(format!(
                                        "malformed stream chunk: {e}"
                                    ))
                                })?;
                            yield parsed;
                        }
                    }
                }
            }
            if !done {
                // The connection ended without [DONE]; the tail may still
                // hold one final unterminated payload.
                if let Some(SseEvent::Data(payload)) = decoder.finish() {
                    let parsed: ChatChunk = serde_json::from_str(&payload).map_err(|e| {
                        ApiError::InvalidResponse(format!("malformed stream chunk: {e}"))
                    })?;
                    yield parsed;
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Derive a human-readable vendor label from the endpoint URL.
fn vendor_label(base_url: &str) -> String {
    let host = base_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split(['/', ':'])
        .next()
        .unwrap_or_default();
    if host.contains("openrouter") {
        return "OpenRouter".to_string();
    }
    let Some(label) = host.split('.').next().filter(|l| !l.is_empty()) else {
        return "Provider".to_string();
    };
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => "Provider".to_string(),
    }
}
