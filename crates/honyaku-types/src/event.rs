//! Application-level streaming events.
//!
//! ```text
//!   upstream SSE bytes ──▶ ChunkDecoder ──▶ StreamEvent ──▶ channel ──▶ Correlator
//!                                          (delta* then exactly one Done | Error)
//! ```
//!
//! For a given [`RequestTag`], zero or more `Delta` events precede exactly one
//! terminal event. Nothing is delivered for a tag after its terminal event.

use serde::{Deserialize, Serialize};

use crate::RequestTag;

/// One decoded event of a streaming exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Incremental text fragment.
    Delta {
        tag: RequestTag,
        text: String,
    },

    /// The exchange completed; `full_text` is the concatenation of all deltas.
    Done {
        tag: RequestTag,
        #[serde(rename = "fullText")]
        full_text: String,
    },

    /// The exchange failed at the transport level.
    Error {
        tag: RequestTag,
        message: String,
        /// Server-declared error code (e.g. a quota code), when one was sent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<i64>,
    },
}

impl StreamEvent {
    /// Build a delta event.
    pub fn delta(tag: RequestTag, text: impl Into<String>) -> Self {
        Self::Delta { tag, text: text.into() }
    }

    /// Build a done event.
    pub fn done(tag: RequestTag, full_text: impl Into<String>) -> Self {
        Self::Done { tag, full_text: full_text.into() }
    }

    /// Build an error event.
    pub fn error(tag: RequestTag, message: impl Into<String>, code: Option<i64>) -> Self {
        Self::Error { tag, message: message.into(), code }
    }

    /// The exchange this event belongs to.
    pub fn tag(&self) -> RequestTag {
        match self {
            Self::Delta { tag, .. } | Self::Done { tag, .. } | Self::Error { tag, .. } => *tag,
        }
    }

    /// Check if this is a terminal event (Done or Error).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Extract delta text if this is a delta event.
    pub fn as_delta(&self) -> Option<&str> {
        match self {
            Self::Delta { text, .. } => Some(text),
            _ => None,
        }
    }
}
