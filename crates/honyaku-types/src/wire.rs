//! Message shapes exchanged between page contexts and the background relay.
//!
//! The JSON form mirrors what the browser side posts through
//! `runtime.sendMessage` / native messaging, so field names are camelCase and
//! the discriminator lives in a `type` field.

use serde::{Deserialize, Serialize};

use crate::{PageContextId, RequestTag, StreamEvent};

/// Prompt text handed to the text-generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPayload {
    /// System instruction, if the composer produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// The user prompt.
    pub prompt: String,
}

impl PromptPayload {
    /// A payload with only a user prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { system: None, prompt: prompt.into() }
    }

    /// Set the system instruction.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Page context → background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientToBackground {
    /// Open one streaming exchange for `tag`.
    #[serde(rename_all = "camelCase")]
    StartStream {
        tag: RequestTag,
        prompt_payload: PromptPayload,
        model: String,
    },

    /// Abort the exchange for `tag`. No-op when it already finished.
    CancelStream { tag: RequestTag },
}

impl ClientToBackground {
    /// The exchange this message refers to.
    pub fn tag(&self) -> RequestTag {
        match self {
            Self::StartStream { tag, .. } | Self::CancelStream { tag } => *tag,
        }
    }
}

/// Background → page context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BackgroundToClient {
    #[serde(rename = "stream-chunk")]
    StreamChunk { tag: RequestTag, text: String },

    #[serde(rename = "stream-end", rename_all = "camelCase")]
    StreamEnd { tag: RequestTag, full_text: String },

    #[serde(rename = "stream-error", rename_all = "camelCase")]
    StreamError {
        tag: RequestTag,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<i64>,
    },
}

impl BackgroundToClient {
    /// The exchange this message belongs to.
    pub fn tag(&self) -> RequestTag {
        match self {
            Self::StreamChunk { tag, .. }
            | Self::StreamEnd { tag, .. }
            | Self::StreamError { tag, .. } => *tag,
        }
    }
}

impl From<StreamEvent> for BackgroundToClient {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Delta { tag, text } => Self::StreamChunk { tag, text },
            StreamEvent::Done { tag, full_text } => Self::StreamEnd { tag, full_text },
            StreamEvent::Error { tag, message, code } => Self::StreamError {
                tag,
                error: message,
                error_code: code,
            },
        }
    }
}

impl From<BackgroundToClient> for StreamEvent {
    fn from(msg: BackgroundToClient) -> Self {
        match msg {
            BackgroundToClient::StreamChunk { tag, text } => StreamEvent::Delta { tag, text },
            BackgroundToClient::StreamEnd { tag, full_text } => StreamEvent::Done { tag, full_text },
            BackgroundToClient::StreamError { tag, error, error_code } => StreamEvent::Error {
                tag,
                message: error,
                code: error_code,
            },
        }
    }
}

/// A message stamped with the page context it came from (or goes to).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub context: PageContextId,
    pub message: T,
}

impl<T> Envelope<T> {
    pub fn new(context: PageContextId, message: T) -> Self {
        Self { context, message }
    }
}
