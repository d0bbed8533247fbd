//! Background actor that owns the table of live relay sessions.
//!
//! Page contexts never touch sessions directly. They post
//! `START_STREAM` / `CANCEL_STREAM` through the message channel, and the hub
//! turns those into [`RelaySession::open`] and [`SessionHandle::cancel`].
//! When a page context goes away its sessions are cancelled too.

use std::sync::Arc;

use dashmap::DashMap;
use honyaku_channel::{BackgroundInbox, MessageChannel};
use honyaku_types::{ClientToBackground, Envelope, PageContextId, RequestTag};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::session::{RelayRequest, RelaySession, SessionHandle, SessionOptions};
use crate::transport::{HttpTransport, PromptTransport, TransportError};

pub struct RelayHub {
    sessions: DashMap<RequestTag, SessionHandle>,
    transport: Arc<dyn PromptTransport>,
    channel: MessageChannel,
    options: SessionOptions,
    default_model: String,
}

impl RelayHub {
    pub fn new(
        transport: Arc<dyn PromptTransport>,
        channel: MessageChannel,
        options: SessionOptions,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            transport,
            channel,
            options,
            default_model: default_model.into(),
        }
    }

    /// Hub over an [`HttpTransport`] built from `config`.
    pub fn from_config(config: &RelayConfig, channel: MessageChannel) -> Result<Self, TransportError> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::new(
            Arc::new(transport),
            channel,
            SessionOptions { idle_timeout: config.idle_timeout() },
            config.default_model.clone(),
        ))
    }

    /// Apply one page message.
    #[tracing::instrument(skip_all, name = "relay.hub.handle", fields(page = %envelope.context.short(), tag = %envelope.message.tag().short()))]
    pub fn handle(&self, envelope: Envelope<ClientToBackground>) {
        self.reap();
        match envelope.message {
            ClientToBackground::StartStream { tag, prompt_payload, model } => {
                let model = if model.trim().is_empty() { self.default_model.clone() } else { model };
                self.start(RelayRequest {
                    tag,
                    payload: prompt_payload,
                    model,
                    destination: envelope.context,
                });
            }
            ClientToBackground::CancelStream { tag } => {
                if !self.cancel(tag) {
                    tracing::trace!("cancel for unknown or finished tag");
                }
            }
        }
    }

    /// Open a session. An open session under the same tag is cancelled first.
    pub fn start(&self, request: RelayRequest) -> RequestTag {
        let tag = request.tag;
        tracing::info!(tag = %tag.short(), model = %request.model, "opening relay session");
        let handle = RelaySession::open(
            request,
            Arc::clone(&self.transport),
            self.channel.clone(),
            self.options,
        );
        if let Some(previous) = self.sessions.insert(tag, handle) {
            if !previous.is_finished() {
                tracing::warn!(tag = %tag.short(), "duplicate START_STREAM, previous session cancelled");
            }
            previous.cancel();
        }
        tag
    }

    /// Cancel and forget a session. Returns whether one was registered.
    pub fn cancel(&self, tag: RequestTag) -> bool {
        match self.sessions.remove(&tag) {
            Some((_, handle)) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every session streaming to `page`. Returns how many.
    pub fn cancel_for(&self, page: PageContextId) -> usize {
        self.cancel_where(|handle| handle.destination() == page)
    }

    /// Cancel sessions whose page context is no longer attached.
    pub fn cancel_orphans(&self) -> usize {
        self.cancel_where(|handle| !self.channel.is_attached(handle.destination()))
    }

    fn cancel_where(&self, doomed: impl Fn(&SessionHandle) -> bool) -> usize {
        let mut cancelled = 0;
        self.sessions.retain(|_, handle| {
            if !doomed(handle) {
                return true;
            }
            handle.cancel();
            cancelled += 1;
            false
        });
        cancelled
    }

    /// Drop handles of sessions whose task has exited.
    pub fn reap(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, handle| !handle.is_finished());
        let reaped = before.saturating_sub(self.sessions.len());
        if reaped > 0 {
            tracing::trace!(reaped, "reaped finished sessions");
        }
        reaped
    }

    /// Sessions not yet reaped (finished ones may linger until the next command).
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    /// Cancel every open session.
    pub fn shutdown(&self) {
        let open = self.sessions.len();
        for entry in self.sessions.iter() {
            entry.value().cancel();
        }
        self.sessions.clear();
        if open > 0 {
            tracing::info!(open, "relay hub shut down, sessions cancelled");
        }
    }

    /// Serve page messages until `shutdown` fires, then cancel what is left.
    ///
    /// Page messages are polled before departures, so a `START_STREAM` posted
    /// just before its page detached is opened and then cancelled.
    pub async fn run(self, mut inbox: BackgroundInbox, shutdown: CancellationToken) {
        tracing::info!("relay hub running");
        let mut departures = self.channel.departures();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => self.handle(envelope),
                    None => break,
                },
                departed = departures.recv() => match departed {
                    Ok(page) => {
                        let cancelled = self.cancel_for(page);
                        if cancelled > 0 {
                            tracing::debug!(page = %page.short(), cancelled, "page gone, sessions cancelled");
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        let cancelled = self.cancel_orphans();
                        tracing::debug!(missed, cancelled, "departures lagged, swept orphaned sessions");
                    }
                    // The hub's own channel keeps the sender alive.
                    Err(RecvError::Closed) => break,
                },
            }
        }
        self.shutdown();
    }
}

impl Drop for RelayHub {
    fn drop(&mut self) {
        for entry in self.sessions.iter() {
            entry.value().cancel();
        }
    }
}
