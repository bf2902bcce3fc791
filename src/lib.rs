//! Heddle: a headless LLM agent harness for OpenAI-compatible APIs.
//!
//! The crate mediates between an external controller and a remote
//! chat-completion API, executing tools locally inside a persistent
//! session. Controllers speak a line-delimited JSON protocol over
//! stdin/stdout; the agent loop underneath drives the send/tool/respond
//! cycle and surfaces a structured event stream.
//!
//! # Quick start
//!
//! ```no_run
//! use heddle::agent::{run_stream, AgentOptions};
//! use heddle::api::{Provider, ProviderOptions};
//! use heddle::tools::builtin_registry;
//! use heddle::types::Message;
//! use futures::StreamExt;
//!
//! # async fn example() {
//! let provider = Provider::new(ProviderOptions {
//!     api_key: std::env::var("OPENROUTER_API_KEY").unwrap_or_default(),
//!     model: "openai/gpt-4o-mini".to_string(),
//!     ..ProviderOptions::default()
//! });
//! let registry = builtin_registry(&[]).unwrap();
//! let mut conversation = vec![Message::user("list the files here")];
//! let mut events = run_stream(&provider, &registry, &mut conversation, AgentOptions::default());
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event.unwrap());
//! }
//! # }
//! ```

/// Core agent loop, event stream, and doom-loop detection.
pub mod agent;
/// Provider client for OpenAI-compatible HTTP APIs.
pub mod api;
/// Compile-time build/version metadata.
pub mod build_info;
/// Config loading, defaults, and layering.
pub mod config;
/// Error types used across crate modules.
pub mod error;
/// Headless worker protocol, codec, versioning, and dispatcher.
pub mod ipc;
/// Append-only JSONL session journal.
pub mod journal;
/// Debug-channel logging setup.
pub mod logging;
/// Session construction and lifetime.
pub mod session;
#[cfg(test)]
/// Shared testing utilities compiled only for tests.
pub mod testsupport;
/// Shared text truncation helpers.
pub mod textutil;
/// Built-in tool implementations and registry.
pub mod tools;
/// API model types for chat/completions payloads.
pub mod types;
