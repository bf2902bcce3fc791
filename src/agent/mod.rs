//! Core agentic loop.
//!
//! The loop drives the conversation: it sends the history to the API,
//! handles tool-call responses by executing tools and re-submitting results,
//! and continues until the model produces a text-only turn (or a termination
//! condition fires). Each run is exposed as a lazy, single-consumer stream
//! of [`AgentEvent`]; the conversation is appended in place, synchronously
//! with event emission, so an observer holding the conversation sees a
//! consistent prefix at every event boundary.
//!
//! Two variants share all semantics except that only [`run_stream`] emits
//! `ContentDelta` events. Provider I/O failures and unknown-tool dispatch
//! surface as the stream's `Err` arm and terminate the run; everything else
//! (no choice, iteration cap, doom loop) is an ordinary event.

mod assembly;
mod events;
mod fingerprint;

pub use assembly::StreamAssembly;
pub use events::AgentEvent;
pub use fingerprint::{call_fingerprint, iteration_fingerprint, RecentCallWindow};

use crate::api::{JsonObject, ModelClient};
use crate::error::AgentError;
use crate::tools::ToolRegistry;
use crate::types::Message;
use async_stream::try_stream;
use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;
use tracing::debug;

/// A lazy, single-consumer run of the agent loop.
pub type AgentEventStream<'a> =
    Pin<Box<dyn Stream<Item = Result<AgentEvent, AgentError>> + Send + 'a>>;

/// Tuning knobs for one run.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Safety cap on remote-call iterations.
    pub max_iterations: usize,
    /// Identical consecutive tool-call turns tolerated before aborting.
    pub doom_loop_threshold: usize,
    /// Per-call request overrides forwarded to the provider.
    pub request_overrides: Option<JsonObject>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            doom_loop_threshold: 3,
            request_overrides: None,
        }
    }
}

/// Run the loop with buffered completions.
pub fn run<'a>(
    client: &'a dyn ModelClient,
    registry: &'a ToolRegistry,
    conversation: &'a mut Vec<Message>,
    options: AgentOptions,
) -> AgentEventStream<'a> {
    Box::pin(try_stream! {
        let tools = registry.definitions();
        let mut window = RecentCallWindow::new(options.doom_loop_threshold);
        let mut terminated = false;

        for iteration in 0..options.max_iterations {
            debug!(iteration, "requesting completion");
            let response = client
                .send(conversation, &tools, options.request_overrides.as_ref())
                .await?;
            let usage = response.usage;

            let Some(choice) = response.choices.into_iter().next() else {
                yield AgentEvent::Error {
                    message: "No choice in response".to_string(),
                };
                terminated = true;
                break;
            };
            let message = choice.message;

            conversation.push(message.clone());
            yield AgentEvent::AssistantMessage {
                message: message.clone(),
            };
            if let Some(usage) = usage {
                yield AgentEvent::Usage { usage };
            }

            let Some(tool_calls) = message.tool_calls.filter(|calls| !calls.is_empty()) else {
                terminated = true;
                break;
            };

            for call in &tool_calls {
                yield AgentEvent::ToolStart {
                    name: call.function.name.clone(),
                    call: call.clone(),
                };
                let result = registry
                    .execute(&call.function.name, &call.function.arguments)
                    .await?;
                yield AgentEvent::ToolEnd {
                    name: call.function.name.clone(),
                    result: result.clone(),
                    call: call.clone(),
                };
                conversation.push(Message::tool_result(&call.id, &result));
            }

            window.push(iteration_fingerprint(&tool_calls));
            if window.is_doom_loop() {
                yield AgentEvent::LoopDetected {
                    count: options.doom_loop_threshold,
                };
                terminated = true;
                break;
            }
        }

        if !terminated {
            yield AgentEvent::Error {
                message: format!(
                    "Max iterations ({}) reached — possible infinite loop",
                    options.max_iterations
                ),
            };
        }
    })
}

/// Run the loop with streamed completions.
///
/// Identical to [`run`] except each remote call is consumed chunk by chunk,
/// emitting `ContentDelta` events and assembling the assistant message per
/// the accumulation rules in [`StreamAssembly`].
pub fn run_stream<'a>(
    client: &'a dyn ModelClient,
    registry: &'a ToolRegistry,
    conversation: &'a mut Vec<Message>,
    options: AgentOptions,
) -> AgentEventStream<'a> {
    Box::pin(try_stream! {
        let tools = registry.definitions();
        let mut window = RecentCallWindow::new(options.doom_loop_threshold);
        let mut terminated = false;

        for iteration in 0..options.max_iterations {
            debug!(iteration, "requesting streamed completion");
            let mut chunks = client
                .stream(conversation, &tools, options.request_overrides.as_ref())
                .await?;

            let mut assembly = StreamAssembly::new();
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                if let Some(text) = assembly.absorb(&chunk) {
                    yield AgentEvent::ContentDelta { text };
                }
            }
            drop(chunks);

            let (message, usage) = assembly.finish();
            conversation.push(message.clone());
            yield AgentEvent::AssistantMessage {
                message: message.clone(),
            };
            if let Some(usage) = usage {
                yield AgentEvent::Usage { usage };
            }

            let Some(tool_calls) = message.tool_calls.filter(|calls| !calls.is_empty()) else {
                terminated = true;
                break;
            };

            for call in &tool_calls {
                yield AgentEvent::ToolStart {
                    name: call.function.name.clone(),
                    call: call.clone(),
                };
                let result = registry
                    .execute(&call.function.name, &call.function.arguments)
                    .await?;
                yield AgentEvent::ToolEnd {
                    name: call.function.name.clone(),
                    result: result.clone(),
                    call: call.clone(),
                };
                conversation.push(Message::tool_result(&call.id, &result));
            }

            window.push(iteration_fingerprint(&tool_calls));
            if window.is_doom_loop() {
                yield AgentEvent::LoopDetected {
                    count: options.doom_loop_threshold,
                };
                terminated = true;
                break;
            }
        }

        if !terminated {
            yield AgentEvent::Error {
                message: format!(
                    "Max iterations ({}) reached — possible infinite loop",
                    options.max_iterations
                ),
            };
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChunkStream;
    use crate::error::{ApiError, ToolError};
    use crate::types::{
        ChatChunk, ChatResponse, Choice, FunctionDefinition, Message, Role, ToolCall,
        ToolDefinition, Usage,
    };
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    /// FIFO mock model client for deterministic loop tests.
    struct MockClient {
        /// Queued buffered responses returned in order by `send`.
        responses: StdMutex<VecDeque<ChatResponse>>,
        /// Queued chunk batches returned in order by `stream`.
        streams: StdMutex<VecDeque<Vec<ChatChunk>>>,
    }

    impl MockClient {
        fn buffered(responses: Vec<ChatResponse>) -> Self {
            Self {
                responses: StdMutex::new(responses.into()),
                streams: StdMutex::new(VecDeque::new()),
            }
        }

        fn streaming(streams: Vec<Vec<ChatChunk>>) -> Self {
            Self {
                responses: StdMutex::new(VecDeque::new()),
                streams: StdMutex::new(streams.into()),
            }
        }

        fn remaining_responses(&self) -> usize {
            self.responses.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl ModelClient for MockClient {
        async fn send(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _overrides: Option<&JsonObject>,
        ) -> Result<ChatResponse, ApiError> {
            self.responses
                .lock()
                .expect("lock")
                .pop_front()
                .ok_or_else(|| ApiError::InvalidResponse("no mock response queued".to_string()))
        }

        async fn stream(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _overrides: Option<&JsonObject>,
        ) -> Result<ChunkStream, ApiError> {
            let chunks = self
                .streams
                .lock()
                .expect("lock")
                .pop_front()
                .ok_or_else(|| ApiError::InvalidResponse("no mock stream queued".to_string()))?;
            Ok(Box::pin(futures::stream::iter(
                chunks.into_iter().map(Ok),
            )))
        }
    }

    #[async_trait]
    impl ModelClient for Arc<MockClient> {
        async fn send(
            &self,
            messages: &[Message],
            tools: &[ToolDefinition],
            overrides: Option<&JsonObject>,
        ) -> Result<ChatResponse, ApiError> {
            (**self).send(messages, tools, overrides).await
        }

        async fn stream(
            &self,
            messages: &[Message],
            tools: &[ToolDefinition],
            overrides: Option<&JsonObject>,
        ) -> Result<ChunkStream, ApiError> {
            (**self).stream(messages, tools, overrides).await
        }
    }

    /// Tool fixture returning its `text` argument.
    struct EchoTool;

    #[async_trait]
    impl crate::tools::Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                tool_type: "function".to_string(),
                function: FunctionDefinition {
                    name: "echo".to_string(),
                    description: "echo the text argument".to_string(),
                    parameters: serde_json::json!({
                        "type": "object",
                        "properties": { "text": { "type": "string" } }
                    }),
                },
            }
        }

        async fn execute(&self, args: &Value) -> Result<String, ToolError> {
            args.get("text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ToolError::InvalidArguments("missing text".into()))
        }
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).expect("register");
        registry
    }

    fn text_response(content: &str, usage: Option<Usage>) -> ChatResponse {
        ChatResponse {
            id: Some("r".to_string()),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: Some("stop".to_string()),
            }],
            usage,
        }
    }

    fn tool_call_response(calls: Vec<ToolCall>) -> ChatResponse {
        ChatResponse {
            id: Some("r".to_string()),
            choices: vec![Choice {
                index: 0,
                message: Message {
                    role: Role::Assistant,
                    content: None,
                    tool_calls: Some(calls),
                    tool_call_id: None,
                    extra: Default::default(),
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
            usage: None,
        }
    }

    fn echo_call(id: &str, text: &str) -> ToolCall {
        ToolCall::function(id, "echo", format!(r#"{{"text":"{text}"}}"#))
    }

    async fn collect(mut stream: AgentEventStream<'_>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(item) = stream.next().await {
            events.push(item.expect("event"));
        }
        events
    }

    fn chunk(json: &str) -> ChatChunk {
        serde_json::from_str(json).expect("chunk fixture")
    }

    // Verifies the full non-streaming tool round trip: event order and
    // conversation growth (user + assistant + tool + assistant).
    #[tokio::test]
    async fn buffered_tool_round_trip() {
        let client = MockClient::buffered(vec![
            tool_call_response(vec![echo_call("call_0", "ping")]),
            text_response("Got: ping", None),
        ]);
        let registry = echo_registry();
        let mut conversation = vec![Message::user("echo ping")];

        let events = collect(run(
            &client,
            &registry,
            &mut conversation,
            AgentOptions::default(),
        ))
        .await;

        let labels: Vec<&str> = events.iter().map(AgentEvent::label).collect();
        assert_eq!(
            labels,
            vec!["assistant_message", "tool_start", "tool_end", "assistant_message"]
        );
        match &events[2] {
            AgentEvent::ToolEnd { name, result, .. } => {
                assert_eq!(name, "echo");
                assert_eq!(result, "ping");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match &events[3] {
            AgentEvent::AssistantMessage { message } => {
                assert_eq!(message.content.as_deref(), Some("Got: ping"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert_eq!(conversation.len(), 4);
        assert_eq!(conversation[1].role, Role::Assistant);
        assert_eq!(conversation[2].role, Role::Tool);
        assert_eq!(conversation[2].tool_call_id.as_deref(), Some("call_0"));
        assert_eq!(conversation[3].role, Role::Assistant);
    }

    // Verifies usage immediately follows its assistant_message.
    #[tokio::test]
    async fn usage_follows_assistant_message() {
        let usage = Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        let client = MockClient::buffered(vec![text_response("done", Some(usage))]);
        let registry = ToolRegistry::new();
        let mut conversation = vec![Message::user("hi")];

        let events = collect(run(
            &client,
            &registry,
            &mut conversation,
            AgentOptions::default(),
        ))
        .await;
        let labels: Vec<&str> = events.iter().map(AgentEvent::label).collect();
        assert_eq!(labels, vec!["assistant_message", "usage"]);
        assert!(matches!(events[1], AgentEvent::Usage { usage: u } if u.total_tokens == 15));
    }

    // Verifies an empty choices array ends the run with an error event.
    #[tokio::test]
    async fn empty_choices_yield_error_event() {
        let client = MockClient::buffered(vec![ChatResponse {
            id: None,
            choices: vec![],
            usage: None,
        }]);
        let registry = ToolRegistry::new();
        let mut conversation = vec![Message::user("hi")];

        let events = collect(run(
            &client,
            &registry,
            &mut conversation,
            AgentOptions::default(),
        ))
        .await;
        assert_eq!(
            events,
            vec![AgentEvent::Error {
                message: "No choice in response".to_string()
            }]
        );
        assert_eq!(conversation.len(), 1);
    }

    // Verifies iteration exhaustion surfaces as an error event.
    #[tokio::test]
    async fn max_iterations_yields_error_event() {
        let client = MockClient::buffered(vec![
            tool_call_response(vec![echo_call("call_0", "one")]),
            tool_call_response(vec![echo_call("call_1", "two")]),
        ]);
        let registry = echo_registry();
        let mut conversation = vec![Message::user("loop")];
        let options = AgentOptions {
            max_iterations: 2,
            ..AgentOptions::default()
        };

        let events = collect(run(&client, &registry, &mut conversation, options)).await;
        match events.last() {
            Some(AgentEvent::Error { message }) => {
                assert!(message.starts_with("Max iterations (2) reached"), "got: {message}");
            }
            other => panic!("unexpected terminal event: {other:?}"),
        }
    }

    // Verifies an unknown tool name aborts the run through the error arm.
    #[tokio::test]
    async fn unknown_tool_is_a_stream_error() {
        let client = MockClient::buffered(vec![tool_call_response(vec![ToolCall::function(
            "call_0", "missing", "{}",
        )])]);
        let registry = echo_registry();
        let mut conversation = vec![Message::user("hi")];

        let mut stream = run(&client, &registry, &mut conversation, AgentOptions::default());
        let mut saw_error = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(_) => {}
                Err(err) => {
                    assert!(matches!(err, AgentError::UnknownTool(ref name) if name == "missing"));
                    saw_error = true;
                }
            }
        }
        assert!(saw_error);
    }

    // Verifies invalid JSON arguments are fed back to the model as a tool
    // result instead of aborting.
    #[tokio::test]
    async fn invalid_tool_arguments_keep_the_loop_alive() {
        let client = MockClient::buffered(vec![
            tool_call_response(vec![ToolCall::function("call_0", "echo", "not json")]),
            text_response("recovered", None),
        ]);
        let registry = echo_registry();
        let mut conversation = vec![Message::user("hi")];

        let events = collect(run(
            &client,
            &registry,
            &mut conversation,
            AgentOptions::default(),
        ))
        .await;
        match &events[2] {
            AgentEvent::ToolEnd { result, .. } => {
                assert_eq!(result, "Error: Invalid JSON arguments: not json");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(
            conversation[2].content.as_deref(),
            Some("Error: Invalid JSON arguments: not json")
        );
    }

    // Verifies three identical tool turns trip the doom-loop detector and
    // the fourth queued response is never consumed.
    #[tokio::test]
    async fn doom_loop_detected_after_threshold_turns() {
        let repeat = || tool_call_response(vec![echo_call("call_0", "same")]);
        let client = Arc::new(MockClient::buffered(vec![
            repeat(),
            repeat(),
            repeat(),
            text_response("never seen", None),
        ]));
        let registry = echo_registry();
        let mut conversation = vec![Message::user("loop")];

        let events = collect(run(
            &client,
            &registry,
            &mut conversation,
            AgentOptions::default(),
        ))
        .await;

        assert_eq!(
            events.last(),
            Some(&AgentEvent::LoopDetected { count: 3 })
        );
        let tool_ends = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolEnd { .. }))
            .count();
        assert_eq!(tool_ends, 3);
        assert_eq!(client.remaining_responses(), 1);
    }

    // Verifies varying arguments never trip the detector.
    #[tokio::test]
    async fn varying_tool_calls_do_not_trip_detection() {
        let client = MockClient::buffered(vec![
            tool_call_response(vec![echo_call("call_0", "one")]),
            tool_call_response(vec![echo_call("call_1", "two")]),
            tool_call_response(vec![echo_call("call_2", "three")]),
            text_response("done", None),
        ]);
        let registry = echo_registry();
        let mut conversation = vec![Message::user("go")];

        let events = collect(run(
            &client,
            &registry,
            &mut conversation,
            AgentOptions::default(),
        ))
        .await;
        assert!(!events
            .iter()
            .any(|e| matches!(e, AgentEvent::LoopDetected { .. })));
        assert!(matches!(
            events.last(),
            Some(AgentEvent::AssistantMessage { message }) if message.content.as_deref() == Some("done")
        ));
    }

    // Verifies streaming assembly across fragmented tool-call arguments:
    // deltas, assembled message, tool round trip, then the final text turn.
    #[tokio::test]
    async fn streaming_assembles_fragmented_arguments() {
        let first_call = vec![
            chunk(r#"{"choices":[{"index":0,"delta":{"content":"Let me "}}]}"#),
            chunk(r#"{"choices":[{"index":0,"delta":{"content":"do that."}}]}"#),
            chunk(r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_0","function":{"name":"echo"}}]}}]}"#),
            chunk(r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"te"}}]}}]}"#),
            chunk(r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"xt\":\""}}]}}]}"#),
            chunk(r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ping\"}"}}]}}]}"#),
            chunk(r#"{"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#),
        ];
        let second_call = vec![
            chunk(r#"{"choices":[{"index":0,"delta":{"content":"Done"}}]}"#),
            chunk(r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#),
        ];
        let client = MockClient::streaming(vec![first_call, second_call]);
        let registry = echo_registry();
        let mut conversation = vec![Message::user("echo ping")];

        let events = collect(run_stream(
            &client,
            &registry,
            &mut conversation,
            AgentOptions::default(),
        ))
        .await;

        let labels: Vec<&str> = events.iter().map(AgentEvent::label).collect();
        assert_eq!(
            labels,
            vec![
                "content_delta",
                "content_delta",
                "assistant_message",
                "tool_start",
                "tool_end",
                "content_delta",
                "assistant_message",
            ]
        );
        assert_eq!(
            events[0],
            AgentEvent::ContentDelta {
                text: "Let me ".to_string()
            }
        );
        match &events[2] {
            AgentEvent::AssistantMessage { message } => {
                assert_eq!(message.content.as_deref(), Some("Let me do that."));
                let calls = message.tool_calls.as_ref().unwrap();
                assert_eq!(calls[0].function.name, "echo");
                assert_eq!(calls[0].function.arguments, r#"{"text":"ping"}"#);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match &events[4] {
            AgentEvent::ToolEnd { result, .. } => assert_eq!(result, "ping"),
            other => panic!("unexpected event: {other:?}"),
        }
        match &events[6] {
            AgentEvent::AssistantMessage { message } => {
                assert_eq!(message.content.as_deref(), Some("Done"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(conversation.len(), 4);
    }
}
