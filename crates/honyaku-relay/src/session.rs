//! One outbound streaming call per request tag.
//!
//! A session submits the prompt, pushes every body chunk through a
//! [`ChunkDecoder`] and forwards the resulting events, in order, to the page
//! context captured when the request arrived. It ends on the first terminal
//! event, on cancellation, or when the body goes quiet for longer than the
//! idle timeout.
//!
//! ```text
//!   submit ──▶ status?
//!                ├─ non-2xx ──▶ read error body ──▶ one stream-error ──▶ end
//!                └─ 2xx ──▶ loop { select! { cancelled, timeout(next chunk) } }
//!                              ├─ bytes   ──▶ decoder.feed_bytes ──▶ send
//!                              ├─ eof     ──▶ decoder.finish(None)
//!                              ├─ failure ──▶ decoder.finish(Some(reason))
//!                              └─ idle    ──▶ stream-error "idle timeout"
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use honyaku_channel::{Destination, MessageChannel};
use honyaku_types::{PageContextId, PromptPayload, RequestTag, StreamEvent};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::{DEFAULT_IDLE_TIMEOUT, MAX_ERROR_BODY_BYTES};
use crate::decoder::ChunkDecoder;
use crate::transport::{ByteStream, PromptTransport};

/// Everything a session needs to know about one request.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub tag: RequestTag,
    pub payload: PromptPayload,
    pub model: String,
    /// Page context that receives every event for this tag.
    pub destination: PageContextId,
}

/// Per-session tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Longest gap allowed between two body reads.
    pub idle_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { idle_timeout: DEFAULT_IDLE_TIMEOUT }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A `Done` event was delivered.
    Completed,
    /// An `Error` event was delivered.
    Failed,
    /// Cancelled before a terminal event; nothing further was sent.
    Cancelled,
}

/// Handle to a running session.
///
/// Dropping the handle does not stop the session; call [`cancel`](Self::cancel).
#[derive(Debug)]
pub struct SessionHandle {
    tag: RequestTag,
    destination: PageContextId,
    token: CancellationToken,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    pub fn tag(&self) -> RequestTag {
        self.tag
    }

    /// Page context the session streams to.
    pub fn destination(&self) -> PageContextId {
        self.destination
    }

    /// Abort the upstream call. No event is sent for this tag afterwards.
    /// Idempotent, also after the session ended on its own.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!(tag = %self.tag.short(), "relay session cancelled");
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the session task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end. `None` if the task panicked.
    pub async fn join(self) -> Option<SessionOutcome> {
        self.task.await.ok()
    }
}

/// A single relay session. Constructed and spawned by [`RelaySession::open`].
pub struct RelaySession {
    request: RelayRequest,
    transport: Arc<dyn PromptTransport>,
    channel: MessageChannel,
    options: SessionOptions,
    token: CancellationToken,
}

impl RelaySession {
    /// Spawn the session on the current tokio runtime.
    pub fn open(
        request: RelayRequest,
        transport: Arc<dyn PromptTransport>,
        channel: MessageChannel,
        options: SessionOptions,
    ) -> SessionHandle {
        let token = CancellationToken::new();
        let tag = request.tag;
        let destination = request.destination;
        let session = RelaySession {
            request,
            transport,
            channel,
            options,
            token: token.clone(),
        };
        let task = tokio::spawn(session.run());
        SessionHandle { tag, destination, token, task }
    }

    #[tracing::instrument(
        skip_all,
        name = "relay.session",
        fields(tag = %self.request.tag.short(), model = %self.request.model, page = %self.request.destination.short())
    )]
    async fn run(self) -> SessionOutcome {
        let submitted = tokio::select! {
            biased;
            _ = self.token.cancelled() => return SessionOutcome::Cancelled,
            r = self.transport.submit(&self.request.payload, &self.request.model) => r,
        };

        let response = match submitted {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "upstream request failed");
                return self.fail(e.to_string(), None);
            }
        };

        if !response.is_success() {
            let status = response.status;
            let Some(body) = self.collect_error_body(response.body).await else {
                return SessionOutcome::Cancelled;
            };
            let (message, code) = parse_error_body(status, &body);
            tracing::warn!(status, code = ?code, %message, "upstream returned error status");
            return self.fail(message, code);
        }

        self.pump(response.body).await
    }

    /// Drive a 2xx body through the decoder until a terminal event.
    async fn pump(&self, mut body: ByteStream) -> SessionOutcome {
        let mut decoder = ChunkDecoder::new(self.request.tag);
        let idle = self.options.idle_timeout;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => return SessionOutcome::Cancelled,
                next = tokio::time::timeout(idle, body.next()) => next,
            };

            let events = match next {
                Ok(Some(Ok(bytes))) => decoder.feed_bytes(&bytes),
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, received = decoder.full_text().len(), "upstream body failed");
                    decoder.finish(Some(&e.to_string()))
                }
                Ok(None) => decoder.finish(None),
                Err(_) => {
                    tracing::warn!(idle_secs = idle.as_secs_f64(), "upstream idle timeout");
                    return self.fail(format!("idle timeout after {}s", idle.as_secs()), None);
                }
            };

            if let Some(outcome) = self.forward(events) {
                if decoder.dropped_frames() > 0 {
                    tracing::debug!(dropped = decoder.dropped_frames(), "malformed frames dropped");
                }
                return outcome;
            }
        }
    }

    /// Send events in order. Returns the outcome once a terminal event went out.
    fn forward(&self, events: Vec<StreamEvent>) -> Option<SessionOutcome> {
        for event in events {
            let outcome = match &event {
                StreamEvent::Delta { .. } => None,
                StreamEvent::Done { .. } => Some(SessionOutcome::Completed),
                StreamEvent::Error { .. } => Some(SessionOutcome::Failed),
            };
            if !self.emit(event) {
                return Some(SessionOutcome::Cancelled);
            }
            if outcome.is_some() {
                return outcome;
            }
        }
        None
    }

    fn fail(&self, message: String, code: Option<i64>) -> SessionOutcome {
        if self.emit(StreamEvent::error(self.request.tag, message, code)) {
            SessionOutcome::Failed
        } else {
            SessionOutcome::Cancelled
        }
    }

    fn emit(&self, event: StreamEvent) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.channel
            .send(Destination::Page(self.request.destination), event.into());
        true
    }

    /// Read a non-2xx body, capped. `None` when cancelled meanwhile.
    async fn collect_error_body(&self, mut body: ByteStream) -> Option<Vec<u8>> {
        let mut collected = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => return None,
                next = tokio::time::timeout(self.options.idle_timeout, body.next()) => next,
            };
            match next {
                Ok(Some(Ok(bytes))) => {
                    let room = MAX_ERROR_BODY_BYTES.saturating_sub(collected.len());
                    collected.extend_from_slice(&bytes[..bytes.len().min(room)]);
                    if collected.len() >= MAX_ERROR_BODY_BYTES {
                        break;
                    }
                }
                // A broken or stalled error body still yields a status-based error.
                Ok(Some(Err(_))) | Ok(None) | Err(_) => break,
            }
        }
        Some(collected)
    }
}

/// Extract `(message, code)` from an upstream error body.
///
/// Accepts `{"error": "...", "errorCode": n}` as well as the nested
/// `{"error": {"message": "...", "code": n}}` shape. Codes given as numeric
/// strings are parsed. Anything else falls back to the HTTP status.
pub fn parse_error_body(status: u16, body: &[u8]) -> (String, Option<i64>) {
    let fallback = format!("upstream returned HTTP {status}");
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        let text = String::from_utf8_lossy(body);
        let text = text.trim();
        if text.is_empty() {
            return (fallback, None);
        }
        let snippet: String = text.chars().take(200).collect();
        return (format!("{fallback}: {snippet}"), None);
    };

    let error = value.get("error");
    let message = match error {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(obj)) => obj.get("message").and_then(Value::as_str).map(str::to_string),
        _ => value.get("message").and_then(Value::as_str).map(str::to_string),
    }
    .filter(|m| !m.is_empty())
    .unwrap_or(fallback);

    let code = ["errorCode", "error_code", "code"]
        .iter()
        .find_map(|key| value.get(*key).and_then(as_code))
        .or_else(|| error.and_then(|e| e.get("code")).and_then(as_code));

    (message, code)
}

fn as_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
