//! Page-side request issuing.
//!
//! [`RelayClient::start`] registers the subscriber *before* posting
//! `START_STREAM`, so no event can arrive for an unregistered tag. Both happen
//! in the same event-loop turn.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use honyaku_channel::PageSender;
use honyaku_types::{ClientToBackground, PromptPayload, RequestTag};

use crate::correlator::{Correlator, StreamSubscriber};

#[derive(Clone)]
pub struct RelayClient {
    sender: PageSender,
    correlator: Rc<Correlator>,
    model: String,
}

impl RelayClient {
    /// `model` may be empty to let the relay pick its default.
    pub fn new(sender: PageSender, correlator: Rc<Correlator>, model: impl Into<String>) -> Self {
        Self {
            sender,
            correlator,
            model: model.into(),
        }
    }

    pub fn correlator(&self) -> &Rc<Correlator> {
        &self.correlator
    }

    /// Open one streaming exchange under a fresh tag.
    pub fn start(&self, payload: PromptPayload, subscriber: Weak<dyn StreamSubscriber>) -> StreamHandle {
        let tag = RequestTag::new();
        self.correlator.register(tag, subscriber);
        self.sender.post(ClientToBackground::StartStream {
            tag,
            prompt_payload: payload,
            model: self.model.clone(),
        });
        tracing::debug!(tag = %tag.short(), "stream requested");
        StreamHandle {
            tag,
            cancelled: Rc::new(Cell::new(false)),
            sender: self.sender.clone(),
            correlator: Rc::downgrade(&self.correlator),
        }
    }
}

/// Cancellation handle for one in-flight request.
#[derive(Clone)]
pub struct StreamHandle {
    tag: RequestTag,
    cancelled: Rc<Cell<bool>>,
    sender: PageSender,
    correlator: Weak<Correlator>,
}

impl StreamHandle {
    pub fn tag(&self) -> RequestTag {
        self.tag
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Stop routing this tag and ask the relay to abort it.
    ///
    /// Idempotent. After the tag terminated on its own nothing is posted.
    pub fn cancel(&self) {
        if self.cancelled.replace(true) {
            return;
        }
        let live = self
            .correlator
            .upgrade()
            .is_some_and(|correlator| correlator.supersede(self.tag));
        if live {
            self.sender.post(ClientToBackground::CancelStream { tag: self.tag });
            tracing::debug!(tag = %self.tag.short(), "stream cancelled");
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("tag", &self.tag)
            .field("cancelled", &self.cancelled.get())
            .finish()
    }
}
