//! Message channel between the background relay and page contexts.
//!
//! The two sides share no memory; everything crosses as owned messages.
//!
//! ```text
//!   PagePort / PageSender            mpsc            BackgroundInbox
//!   ┌──────────────────────┐  ─────────────────▶  ┌──────────────────────┐
//!   │ .post(StartStream)   │  Envelope{context}   │ RelayHub::run()      │
//!   │ .recv() / on_message │  ◀─────────────────  │ MessageChannel::send │
//!   └──────────────────────┘   per-page mpsc      └──────────────────────┘
//! ```
//!
//! Delivery is at most once and fire-and-forget: sending to a page context
//! that has detached (tab closed) is a silent no-op, never an error and never
//! retried. Each page context has its own FIFO queue, so messages to one
//! destination arrive in send order; there is no ordering across destinations.
//!
//! Contexts that go away (detached, port dropped, receiver gone) are announced
//! on [`MessageChannel::departures`] so the background can stop work for them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use honyaku_types::{BackgroundToClient, ClientToBackground, Envelope, PageContextId};
use tokio::sync::{broadcast, mpsc};

/// Departure notices buffered per subscriber before it lags.
const DEPARTURE_CAPACITY: usize = 64;

/// Where a background message should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// One page context.
    Page(PageContextId),
    /// Every attached page context; those without a matching subscriber ignore it.
    Broadcast,
}

impl From<PageContextId> for Destination {
    fn from(id: PageContextId) -> Self {
        Self::Page(id)
    }
}

// ============================================================================
// MessageChannel (background side)
// ============================================================================

struct PageSlot {
    tx: mpsc::UnboundedSender<BackgroundToClient>,
    generation: u64,
}

struct Inner {
    pages: DashMap<PageContextId, PageSlot>,
    background_tx: mpsc::UnboundedSender<Envelope<ClientToBackground>>,
    next_generation: AtomicU64,
    departures: broadcast::Sender<PageContextId>,
}

impl Inner {
    fn departed(&self, id: PageContextId) {
        // No subscribers is fine.
        let _ = self.departures.send(id);
    }
}

/// Background-side handle: attaches page contexts and sends to them.
///
/// Cheap to clone; all clones share the same page table.
#[derive(Clone)]
pub struct MessageChannel {
    inner: Arc<Inner>,
}

/// Receiving end for messages posted by page contexts.
pub struct BackgroundInbox {
    rx: mpsc::UnboundedReceiver<Envelope<ClientToBackground>>,
}

impl BackgroundInbox {
    /// Next message from any page context. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Envelope<ClientToBackground>> {
        self.rx.recv().await
    }
}

impl MessageChannel {
    /// Create a channel and the background inbox that receives page messages.
    pub fn new() -> (Self, BackgroundInbox) {
        let (background_tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            pages: DashMap::new(),
            background_tx,
            next_generation: AtomicU64::new(0),
            departures: broadcast::channel(DEPARTURE_CAPACITY).0,
        });
        (Self { inner }, BackgroundInbox { rx })
    }

    /// Attach a new page context with a fresh id.
    pub fn attach_page(&self) -> PagePort {
        self.attach_page_with_id(PageContextId::new())
    }

    /// Attach a page context under a known id (e.g. one announced by the host).
    ///
    /// Re-attaching an id replaces the previous port's queue; the old port
    /// stops receiving.
    pub fn attach_page_with_id(&self, id: PageContextId) -> PagePort {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        if self.inner.pages.insert(id, PageSlot { tx, generation }).is_some() {
            tracing::warn!(page = %id.short(), "page context re-attached, previous port replaced");
        }
        tracing::debug!(page = %id.short(), "page context attached");
        PagePort {
            id,
            generation,
            rx,
            sender: PageSender {
                id,
                background_tx: self.inner.background_tx.clone(),
            },
            inner: Arc::clone(&self.inner),
        }
    }

    /// Detach a page context. Later sends to it are no-ops.
    pub fn detach(&self, id: PageContextId) {
        if self.inner.pages.remove(&id).is_some() {
            tracing::debug!(page = %id.short(), "page context detached");
            self.inner.departed(id);
        }
    }

    /// Ids of page contexts as they go away. Only departures after the call
    /// are seen.
    pub fn departures(&self) -> broadcast::Receiver<PageContextId> {
        self.inner.departures.subscribe()
    }

    /// Fire-and-forget delivery. Never fails, never retries.
    pub fn send(&self, destination: Destination, message: BackgroundToClient) {
        match destination {
            Destination::Page(id) => {
                let delivered = self.inner.pages.get(&id).map(|slot| slot.tx.send(message).is_ok());
                match delivered {
                    Some(true) => {}
                    Some(false) => {
                        // Receiver dropped without detaching; forget it.
                        if self.inner.pages.remove(&id).is_some() {
                            self.inner.departed(id);
                        }
                        tracing::trace!(page = %id.short(), "page context gone, message dropped");
                    }
                    None => {
                        tracing::trace!(page = %id.short(), "no such page context, message dropped");
                    }
                }
            }
            Destination::Broadcast => {
                for slot in self.inner.pages.iter() {
                    let _ = slot.tx.send(message.clone());
                }
            }
        }
    }

    /// Number of attached page contexts.
    pub fn page_count(&self) -> usize {
        self.inner.pages.len()
    }

    /// Whether a page context is currently attached.
    pub fn is_attached(&self, id: PageContextId) -> bool {
        self.inner.pages.contains_key(&id)
    }
}

// ============================================================================
// PagePort (page side)
// ============================================================================

/// Cloneable posting half of a page context.
#[derive(Clone)]
pub struct PageSender {
    id: PageContextId,
    background_tx: mpsc::UnboundedSender<Envelope<ClientToBackground>>,
}

impl PageSender {
    /// The page context this sender stamps onto every message.
    pub fn id(&self) -> PageContextId {
        self.id
    }

    /// Post to the background. A stopped background is a silent no-op.
    pub fn post(&self, message: ClientToBackground) {
        if self.background_tx.send(Envelope::new(self.id, message)).is_err() {
            tracing::trace!(page = %self.id.short(), "background gone, message dropped");
        }
    }
}

/// A page context's end of the channel. Dropping it detaches the context.
pub struct PagePort {
    id: PageContextId,
    generation: u64,
    rx: mpsc::UnboundedReceiver<BackgroundToClient>,
    sender: PageSender,
    inner: Arc<Inner>,
}

impl PagePort {
    pub fn id(&self) -> PageContextId {
        self.id
    }

    /// A cloneable handle for posting to the background.
    pub fn sender(&self) -> PageSender {
        self.sender.clone()
    }

    /// Post to the background.
    pub fn post(&self, message: ClientToBackground) {
        self.sender.post(message);
    }

    /// Next message for this page context. `None` once detached.
    pub async fn recv(&mut self) -> Option<BackgroundToClient> {
        self.rx.recv().await
    }

    /// Invoke `handler` for every message, relevant or not, until detached.
    pub async fn on_message<F>(mut self, mut handler: F)
    where
        F: FnMut(BackgroundToClient),
    {
        while let Some(message) = self.rx.recv().await {
            handler(message);
        }
        tracing::debug!(page = %self.id.short(), "page port closed");
    }
}

impl Drop for PagePort {
    fn drop(&mut self) {
        let generation = self.generation;
        if self.inner.pages.remove_if(&self.id, |_, slot| slot.generation == generation).is_some() {
            self.inner.departed(self.id);
        }
    }
}
