//! Request correlator: routes inbound stream events to their subscriber.
//!
//! ```text
//!   PagePort ──▶ dispatch(event) ──▶ table[tag] ──▶ subscriber.on_delta / on_done / on_error
//!                                       │
//!                     terminal: entry removed *before* the callback runs
//! ```
//!
//! The table is only touched synchronously within one event-loop turn, so a
//! `RefCell` is enough. No borrow is held while a callback runs: callbacks may
//! register, unregister or cancel (including their own tag) freely.
//!
//! Subscribers are held weakly. An overlay that was dropped without
//! unregistering simply stops receiving; its entry is purged on the next
//! event for that tag.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::{Rc, Weak};

use honyaku_types::{RequestTag, StreamEvent};

/// How many cancelled tags are remembered for stale-event accounting.
const SUPERSEDED_CAPACITY: usize = 256;

/// Receiver of one or more tags' events.
pub trait StreamSubscriber {
    fn on_delta(&self, tag: RequestTag, text: &str);
    fn on_done(&self, tag: RequestTag, full_text: &str);
    fn on_error(&self, tag: RequestTag, message: &str, code: Option<i64>);
}

/// Dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    /// Events handed to a subscriber.
    pub delivered: u64,
    /// Events for tags never seen or already terminated.
    pub unknown: u64,
    /// Events for tags that were cancelled while in flight.
    pub stale: u64,
}

enum Target {
    Weak(Weak<dyn StreamSubscriber>),
    Owned(Rc<dyn StreamSubscriber>),
}

impl Target {
    fn upgrade(&self) -> Option<Rc<dyn StreamSubscriber>> {
        match self {
            Self::Weak(w) => w.upgrade(),
            Self::Owned(rc) => Some(Rc::clone(rc)),
        }
    }
}

struct Entry {
    id: u64,
    target: Target,
}

#[derive(Default)]
struct Table {
    entries: HashMap<RequestTag, Entry>,
    superseded: HashSet<RequestTag>,
    superseded_order: VecDeque<RequestTag>,
    stats: CorrelatorStats,
}

impl Table {
    fn remember_superseded(&mut self, tag: RequestTag) {
        if self.superseded.insert(tag) {
            self.superseded_order.push_back(tag);
            if self.superseded_order.len() > SUPERSEDED_CAPACITY
                && let Some(oldest) = self.superseded_order.pop_front()
            {
                self.superseded.remove(&oldest);
            }
        }
    }
}

/// Page-side routing table, keyed by [`RequestTag`].
#[derive(Default)]
pub struct Correlator {
    table: RefCell<Table>,
    next_id: Cell<u64>,
}

impl Correlator {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Route `tag` to a weakly held subscriber.
    pub fn register(self: &Rc<Self>, tag: RequestTag, subscriber: Weak<dyn StreamSubscriber>) -> Registration {
        self.insert(tag, Target::Weak(subscriber))
    }

    /// Route `tag` to a set of closures owned by the table.
    ///
    /// The closures are dropped when the tag terminates or is unregistered.
    pub fn register_callbacks(
        self: &Rc<Self>,
        tag: RequestTag,
        on_delta: impl FnMut(&str) + 'static,
        on_done: impl FnMut(&str) + 'static,
        on_error: impl FnMut(&str, Option<i64>) + 'static,
    ) -> Registration {
        let callbacks = Callbacks {
            on_delta: RefCell::new(Box::new(on_delta)),
            on_done: RefCell::new(Box::new(on_done)),
            on_error: RefCell::new(Box::new(on_error)),
        };
        self.insert(tag, Target::Owned(Rc::new(callbacks)))
    }

    fn insert(self: &Rc<Self>, tag: RequestTag, target: Target) -> Registration {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let mut table = self.table.borrow_mut();
        table.superseded.remove(&tag);
        if table.entries.insert(tag, Entry { id, target }).is_some() {
            tracing::warn!(tag = %tag.short(), "duplicate registration, previous subscriber replaced");
        }
        Registration {
            tag,
            id,
            correlator: Rc::downgrade(self),
            active: Cell::new(true),
        }
    }

    /// Route one event. Never panics; unknown tags are ignored.
    pub fn dispatch(&self, event: StreamEvent) {
        let tag = event.tag();
        let terminal = event.is_terminal();

        let subscriber = {
            let mut table = self.table.borrow_mut();
            let found = table.entries.get(&tag).map(|entry| entry.target.upgrade());
            let subscriber = match found {
                Some(subscriber) => subscriber,
                None => {
                    if table.superseded.contains(&tag) {
                        table.stats.stale += 1;
                        tracing::trace!(tag = %tag.short(), "event for cancelled tag dropped");
                    } else {
                        table.stats.unknown += 1;
                        tracing::trace!(tag = %tag.short(), "event for unknown tag dropped");
                    }
                    return;
                }
            };
            if terminal || subscriber.is_none() {
                table.entries.remove(&tag);
            }
            match subscriber {
                Some(s) => {
                    table.stats.delivered += 1;
                    s
                }
                None => {
                    table.stats.unknown += 1;
                    tracing::debug!(tag = %tag.short(), "subscriber gone, entry purged");
                    return;
                }
            }
        };

        match event {
            StreamEvent::Delta { tag, text } => subscriber.on_delta(tag, &text),
            StreamEvent::Done { tag, full_text } => subscriber.on_done(tag, &full_text),
            StreamEvent::Error { tag, message, code } => subscriber.on_error(tag, &message, code),
        }
    }

    /// Drop the entry for a cancelled tag; later events count as stale.
    ///
    /// Returns whether an entry was live.
    pub fn supersede(&self, tag: RequestTag) -> bool {
        let mut table = self.table.borrow_mut();
        let live = table.entries.remove(&tag).is_some();
        table.remember_superseded(tag);
        live
    }

    pub fn is_registered(&self, tag: RequestTag) -> bool {
        self.table.borrow().entries.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.table.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CorrelatorStats {
        self.table.borrow().stats
    }

    fn unregister(&self, tag: RequestTag, id: u64) -> bool {
        let mut table = self.table.borrow_mut();
        match table.entries.get(&tag) {
            Some(entry) if entry.id == id => {
                table.entries.remove(&tag);
                true
            }
            _ => false,
        }
    }
}

/// Unregister handle returned by [`Correlator::register`].
///
/// Only removes the entry it created: after a duplicate registration replaced
/// it, unregistering is a no-op. Dropping the handle does not unregister.
pub struct Registration {
    tag: RequestTag,
    id: u64,
    correlator: Weak<Correlator>,
    active: Cell<bool>,
}

impl Registration {
    pub fn tag(&self) -> RequestTag {
        self.tag
    }

    /// Idempotent.
    pub fn unregister(&self) {
        if self.active.replace(false)
            && let Some(correlator) = self.correlator.upgrade()
        {
            correlator.unregister(self.tag, self.id);
        }
    }
}

type TextCallback = Box<dyn FnMut(&str)>;
type ErrorCallback = Box<dyn FnMut(&str, Option<i64>)>;

struct Callbacks {
    on_delta: RefCell<TextCallback>,
    on_done: RefCell<TextCallback>,
    on_error: RefCell<ErrorCallback>,
}

impl StreamSubscriber for Callbacks {
    fn on_delta(&self, _tag: RequestTag, text: &str) {
        if let Ok(mut f) = self.on_delta.try_borrow_mut() {
            f(text);
        }
    }

    fn on_done(&self, _tag: RequestTag, full_text: &str) {
        if let Ok(mut f) = self.on_done.try_borrow_mut() {
            f(full_text);
        }
    }

    fn on_error(&self, _tag: RequestTag, message: &str, code: Option<i64>) {
        if let Ok(mut f) = self.on_error.try_borrow_mut() {
            f(message, code);
        }
    }
}
