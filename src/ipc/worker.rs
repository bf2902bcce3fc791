//! The headless line-oriented worker.
//!
//! A single cooperative task owns all worker state. Stdin lines arrive over
//! a channel (a reader task feeds it), decoded requests enter a FIFO queue,
//! and a re-entrancy-guarded dispatcher drains the queue one request at a
//! time. While a `send` is running, the dispatcher drains newly arrived
//! lines into the queue at every agent-event boundary and honors `cancel`
//! requests there; nothing interrupts an in-flight HTTP read or tool
//! execution.

use super::codec::{decode_request, encode_response};
use super::protocol::{
    InitConfig, IpcRequest, IpcResponse, SendResult, ToolCallRecord, WorkerEvent,
};
use super::version::{check_compatibility, own_version, Compatibility, ProtocolVersion};
use crate::agent::{run_stream, AgentEvent, AgentOptions};
use crate::error::{AgentError, ApiError};
use crate::session::{create_session, Session, SessionSetup};
use crate::textutil::preview_by_chars;
use crate::types::{Message, Usage};
use futures::StreamExt;
use regex::Regex;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

/// Preview cap for `tool_end` events.
const RESULT_PREVIEW_CHARS: usize = 500;

/// Pluggable session construction, used to inject mock sessions in tests
/// and CLI-level defaults in `main`.
pub type SessionFactory = Box<dyn Fn(SessionSetup) -> Result<Session, String> + Send>;

/// Aggregation state for one `send` in flight.
#[derive(Default)]
struct SendOutcome {
    tool_calls_made: Vec<ToolCallRecord>,
    iterations: usize,
    usage: Option<Usage>,
    saw_delta: bool,
    /// Last assistant content cached while no delta had been seen.
    candidate_response: Option<String>,
    /// Last assistant content observed at all (used on streaming runs).
    last_text_content: Option<String>,
    pending_error: Option<String>,
}

impl SendOutcome {
    fn response(&self) -> Option<String> {
        if self.saw_delta {
            self.last_text_content.clone()
        } else {
            self.candidate_response.clone()
        }
    }
}

/// Worker state machine over in/out line channels.
pub struct Worker {
    session: Option<Session>,
    active_id: Option<String>,
    cancel_target_id: Option<String>,
    queue: VecDeque<IpcRequest>,
    processing: bool,
    stdin_closed: bool,
    out: mpsc::UnboundedSender<String>,
    session_factory: SessionFactory,
}

impl Worker {
    /// Build a worker writing response lines to `out`.
    pub fn new(out: mpsc::UnboundedSender<String>) -> Self {
        Self::with_session_factory(out, Box::new(create_session))
    }

    /// Build a worker with an explicit session factory.
    ///
    /// Used for deterministic testing with mock providers.
    pub fn with_session_factory(
        out: mpsc::UnboundedSender<String>,
        session_factory: SessionFactory,
    ) -> Self {
        Self {
            session: None,
            active_id: None,
            cancel_target_id: None,
            queue: VecDeque::new(),
            processing: false,
            stdin_closed: false,
            out,
            session_factory,
        }
    }

    /// Consume input lines until exit; returns the process exit code.
    pub async fn run(mut self, mut input: mpsc::UnboundedReceiver<String>) -> i32 {
        loop {
            match input.recv().await {
                Some(line) => {
                    self.ingest_line(&line);
                    if let Some(code) = self.pump(&mut input).await {
                        return code;
                    }
                }
                None => {
                    self.stdin_closed = true;
                    return self.pump(&mut input).await.unwrap_or(0);
                }
            }
        }
    }

    /// Decode one line into the queue, or answer with a decode-error result.
    fn ingest_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match decode_request(line) {
            Ok(request) => self.queue.push_back(request),
            Err(err) => {
                let id = err.id.unwrap_or_else(|| "unknown".to_string());
                self.emit(&IpcResponse::error_result(id, err.message));
            }
        }
    }

    /// Drain the queue, one fully-handled request at a time.
    async fn pump(&mut self, input: &mut mpsc::UnboundedReceiver<String>) -> Option<i32> {
        if self.processing {
            return None;
        }
        self.processing = true;
        while let Some(request) = self.queue.pop_front() {
            if let Some(code) = self.handle(request, input).await {
                self.processing = false;
                return Some(code);
            }
        }
        self.processing = false;
        if self.stdin_closed {
            return Some(0);
        }
        None
    }

    async fn handle(
        &mut self,
        request: IpcRequest,
        input: &mut mpsc::UnboundedReceiver<String>,
    ) -> Option<i32> {
        match request {
            IpcRequest::Init {
                id,
                protocol_version,
                config,
            } => self.handle_init(id, protocol_version, config),
            IpcRequest::Send { id, message } => {
                self.handle_send(id, message, input).await;
                None
            }
            IpcRequest::Status { id } => {
                self.handle_status(id);
                None
            }
            IpcRequest::Shutdown { id } => {
                self.emit(&IpcResponse::ShutdownOk { id });
                Some(0)
            }
            IpcRequest::Cancel { target_id, .. } => {
                if self.active_id.as_deref() == Some(target_id.as_str()) {
                    self.cancel_target_id = Some(target_id);
                } else {
                    // A cancel whose target never became active is dropped.
                    debug!(target = %target_id, "dropping cancel for inactive target");
                }
                None
            }
        }
    }

    fn handle_init(
        &mut self,
        id: String,
        protocol_version: Option<String>,
        config: InitConfig,
    ) -> Option<i32> {
        if self.session.is_some() {
            self.emit(&IpcResponse::error_result(id, "Already initialized."));
            return None;
        }

        if let Some(raw) = protocol_version {
            match raw.parse::<ProtocolVersion>() {
                Ok(theirs) => match check_compatibility(own_version(), theirs) {
                    Compatibility::Incompatible => {
                        self.emit(&IpcResponse::error_result(id, "protocol_version_mismatch"));
                        return Some(1);
                    }
                    Compatibility::MinorDiffers => {
                        debug!(ours = %own_version(), theirs = %theirs, "protocol minor version differs");
                    }
                    Compatibility::PatchDiffers | Compatibility::Exact => {}
                },
                Err(err) => {
                    self.emit(&IpcResponse::error_result(id, err));
                    return None;
                }
            }
        }

        let setup = SessionSetup {
            model: config.model,
            system_prompt: config.system_prompt,
            tools: config.tools,
            cwd: config.cwd,
            max_iterations: config.max_iterations,
            agents_context: None,
        };
        match (self.session_factory)(setup) {
            Ok(session) => {
                let session_id = session.session_id.clone();
                self.session = Some(session);
                self.emit(&IpcResponse::InitOk {
                    id,
                    session_id,
                    protocol_version: own_version().to_string(),
                });
            }
            Err(err) => self.emit(&IpcResponse::error_result(id, err)),
        }
        None
    }

    fn handle_status(&mut self, id: String) {
        let Some(session) = &self.session else {
            self.emit(&IpcResponse::error_result(
                id,
                "Not initialized. Send 'init' first.",
            ));
            return;
        };
        self.emit(&IpcResponse::StatusOk {
            id,
            model: session.model.clone(),
            messages_count: session.conversation.len(),
            session_id: session.session_id.clone(),
            active: self.active_id.is_some(),
        });
    }

    async fn handle_send(
        &mut self,
        id: String,
        message: String,
        input: &mut mpsc::UnboundedReceiver<String>,
    ) {
        if self.active_id.is_some() {
            self.emit(&IpcResponse::error_result(id, "A send is already in progress."));
            return;
        }
        let Some(mut session) = self.session.take() else {
            self.emit(&IpcResponse::error_result(
                id,
                "Not initialized. Send 'init' first.",
            ));
            return;
        };
        self.active_id = Some(id.clone());
        self.cancel_target_id = None;

        let user = Message::user(&message);
        session.conversation.push(user.clone());
        if let Err(err) = session.journal.append_message(&user) {
            self.emit(&IpcResponse::error_result(&id, err));
            self.active_id = None;
            self.session = Some(session);
            return;
        }
        let journaled_len = session.conversation.len();

        let options = AgentOptions {
            max_iterations: session.max_iterations,
            doom_loop_threshold: session.doom_loop_threshold,
            request_overrides: None,
        };

        let mut outcome = SendOutcome::default();
        let mut thrown: Option<AgentError> = None;
        let mut cancelled = false;
        {
            let mut stream = run_stream(
                session.client.as_ref(),
                &session.registry,
                &mut session.conversation,
                options,
            );
            while let Some(item) = stream.next().await {
                // Event boundary: fold in controller lines that arrived
                // mid-run, then honor a pending cancel.
                self.drain_input(input);
                if self.take_cancel_for(&id) {
                    cancelled = true;
                    break;
                }
                match item {
                    Ok(event) => self.apply_event(event, &mut outcome),
                    Err(err) => {
                        thrown = Some(err);
                        break;
                    }
                }
            }
        }

        // Whatever the run appended is journaled before the result closes
        // the request.
        let mut journal_error: Option<String> = None;
        for appended in &session.conversation[journaled_len..] {
            if let Err(err) = session.journal.append_message(appended) {
                journal_error = Some(err);
                break;
            }
        }

        let result = if cancelled {
            SendResult {
                id: id.clone(),
                status: "error".to_string(),
                response: None,
                tool_calls_made: std::mem::take(&mut outcome.tool_calls_made),
                usage: outcome.usage,
                iterations: outcome.iterations,
                error: Some("cancelled".to_string()),
            }
        } else if let Some(err) = thrown {
            let normalized = normalize_agent_error(&err);
            self.emit(&IpcResponse::Event {
                event: normalized.to_worker_event(),
            });
            SendResult {
                id: id.clone(),
                status: "error".to_string(),
                response: None,
                tool_calls_made: std::mem::take(&mut outcome.tool_calls_made),
                usage: outcome.usage,
                iterations: outcome.iterations,
                error: Some(normalized.error),
            }
        } else if let Some(pending) = outcome.pending_error.take() {
            SendResult {
                id: id.clone(),
                status: "error".to_string(),
                response: None,
                tool_calls_made: std::mem::take(&mut outcome.tool_calls_made),
                usage: outcome.usage,
                iterations: outcome.iterations,
                error: Some(pending),
            }
        } else if let Some(err) = journal_error {
            SendResult {
                id: id.clone(),
                status: "error".to_string(),
                response: None,
                tool_calls_made: std::mem::take(&mut outcome.tool_calls_made),
                usage: outcome.usage,
                iterations: outcome.iterations,
                error: Some(err),
            }
        } else {
            SendResult {
                id: id.clone(),
                status: "ok".to_string(),
                response: outcome.response(),
                tool_calls_made: std::mem::take(&mut outcome.tool_calls_made),
                usage: outcome.usage,
                iterations: outcome.iterations,
                error: None,
            }
        };
        self.emit(&IpcResponse::Result(result));
        self.active_id = None;
        self.session = Some(session);
    }

    /// Map one agent event onto the wire and update aggregates.
    fn apply_event(&mut self, event: AgentEvent, outcome: &mut SendOutcome) {
        match event {
            AgentEvent::ContentDelta { text } => {
                outcome.saw_delta = true;
                self.emit(&IpcResponse::Event {
                    event: WorkerEvent::ContentDelta { text },
                });
            }
            AgentEvent::ToolStart { name, call } => {
                let args = serde_json::from_str::<Value>(&call.function.arguments)
                    .unwrap_or_else(|_| Value::Object(Default::default()));
                outcome.tool_calls_made.push(ToolCallRecord {
                    name: name.clone(),
                    args: args.clone(),
                });
                self.emit(&IpcResponse::Event {
                    event: WorkerEvent::ToolStart { name, args },
                });
            }
            AgentEvent::ToolEnd { name, result, .. } => {
                self.emit(&IpcResponse::Event {
                    event: WorkerEvent::ToolEnd {
                        name,
                        result_preview: preview_by_chars(&result, RESULT_PREVIEW_CHARS),
                    },
                });
            }
            AgentEvent::Usage { usage } => {
                outcome.usage = Some(usage);
                self.emit(&IpcResponse::Event {
                    event: WorkerEvent::Usage {
                        prompt_tokens: usage.prompt_tokens,
                        completion_tokens: usage.completion_tokens,
                        total_tokens: usage.total_tokens,
                    },
                });
            }
            AgentEvent::LoopDetected { count } => {
                let message = format!("Doom loop detected: {count} iterations");
                outcome.pending_error = Some(message.clone());
                self.emit(&IpcResponse::Event {
                    event: WorkerEvent::Error {
                        error: message,
                        code: Some("loop_detected".to_string()),
                        provider: None,
                        details: None,
                    },
                });
            }
            AgentEvent::AssistantMessage { message } => {
                outcome.iterations += 1;
                if let Some(content) = message.content.filter(|c| !c.is_empty()) {
                    if !outcome.saw_delta {
                        outcome.candidate_response = Some(content.clone());
                    }
                    outcome.last_text_content = Some(content);
                }
            }
            AgentEvent::Error { message } => {
                outcome.pending_error = Some(message.clone());
                self.emit(&IpcResponse::Event {
                    event: WorkerEvent::Error {
                        error: message,
                        code: None,
                        provider: None,
                        details: None,
                    },
                });
            }
        }
    }

    /// Move any lines the controller wrote mid-send into the request queue.
    fn drain_input(&mut self, input: &mut mpsc::UnboundedReceiver<String>) {
        while let Ok(line) = input.try_recv() {
            self.ingest_line(&line);
        }
    }

    /// True when a cancel targeting the active send is pending; consumes a
    /// queued cancel when that is where it was found.
    fn take_cancel_for(&mut self, active: &str) -> bool {
        if self.cancel_target_id.as_deref() == Some(active) {
            return true;
        }
        let mut found = false;
        self.queue.retain(|request| {
            if !found {
                if let IpcRequest::Cancel { target_id, .. } = request {
                    if target_id == active {
                        found = true;
                        return false;
                    }
                }
            }
            true
        });
        found
    }

    fn emit(&self, response: &IpcResponse) {
        let _ = self.out.send(encode_response(response));
    }
}

/// Run the worker over real stdin/stdout; returns the exit code.
pub async fn run_stdio() -> i32 {
    run_stdio_with(Box::new(create_session)).await
}

/// [`run_stdio`] with an explicit session factory.
pub async fn run_stdio_with(session_factory: SessionFactory) -> i32 {
    let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if in_tx.send(line).is_err() {
                break;
            }
        }
    });

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if stdout.write_all(b"\n").await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let code = Worker::with_session_factory(out_tx, session_factory)
        .run(in_rx)
        .await;
    // The worker's sender is dropped with it, so the writer drains and ends.
    let _ = writer.await;
    code
}

// ---------------------------------------------------------------------------
// Error normalization
// ---------------------------------------------------------------------------

/// Raw provider-error shape: `"<Provider> API error (<status>): <body>"`.
const API_ERROR_PATTERN: &str = r"^(.+?)\s+API error\s+\((\d+)\):\s*([\s\S]*)$";

/// Controller-facing form of a failure that escaped the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedError {
    pub error: String,
    pub code: String,
    pub provider: Option<String>,
    pub details: Option<Value>,
}

impl NormalizedError {
    fn to_worker_event(&self) -> WorkerEvent {
        WorkerEvent::Error {
            error: self.error.clone(),
            code: Some(self.code.clone()),
            provider: self.provider.clone(),
            details: self.details.clone(),
        }
    }
}

/// Error code for a failure that escaped the agent loop.
fn error_code(err: &AgentError) -> &'static str {
    match err {
        AgentError::Api(ApiError::Status { .. }) | AgentError::Api(ApiError::Http(_)) => {
            "provider_error"
        }
        AgentError::Api(ApiError::InvalidResponse(_)) => "protocol_error",
        AgentError::UnknownTool(_) => "tool_error",
    }
}

/// Fallback message when no better text can be extracted.
fn code_label(code: &str) -> &'static str {
    match code {
        "provider_error" => "Provider error",
        "tool_error" => "Tool error",
        "protocol_error" => "Protocol error",
        "loop_detected" => "Doom loop detected",
        "timeout" => "Timeout",
        _ => "Error",
    }
}

/// Normalize a loop failure for the wire.
pub fn normalize_agent_error(err: &AgentError) -> NormalizedError {
    normalize_error(&err.to_string(), error_code(err))
}

/// Normalize a raw error string given its code.
pub fn normalize_error(raw: &str, code: &str) -> NormalizedError {
    if let Some(caps) = Regex::new(API_ERROR_PATTERN)
        .ok()
        .and_then(|re| re.captures(raw))
    {
        let provider = caps[1].to_lowercase();
        let raw_details = caps[3].to_string();
        let (error, details) = match serde_json::from_str::<Value>(&raw_details) {
            Ok(parsed) => {
                let message = parsed
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| {
                        parsed
                            .get("error")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .or_else(|| {
                        parsed
                            .as_str()
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| code_label(code).to_string());
                (message, Some(parsed))
            }
            Err(_) => {
                let trimmed = raw_details.trim();
                let message = if trimmed.is_empty() {
                    code_label(code).to_string()
                } else {
                    trimmed.to_string()
                };
                (message, Some(Value::String(raw_details)))
            }
        };
        return NormalizedError {
            error,
            code: code.to_string(),
            provider: Some(provider),
            details,
        };
    }

    if raw.contains("API error") {
        return NormalizedError {
            error: code_label(code).to_string(),
            code: code.to_string(),
            provider: None,
            details: Some(Value::String(raw.to_string())),
        };
    }

    NormalizedError {
        error: raw.to_string(),
        code: code.to_string(),
        provider: None,
        details: None,
    }
}
