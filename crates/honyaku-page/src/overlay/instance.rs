use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use honyaku_types::RequestTag;

use super::layout::ResizeTracker;
use super::manager::ManagerInner;
use super::{OverlayClass, OverlayId, OverlayState, SubStreamKind};
use crate::client::StreamHandle;
use crate::collaborators::Severity;
use crate::correlator::StreamSubscriber;
use crate::dom::NodeId;
use crate::sink::{NodeSink, RenderSink};

/// Render progress of one sub-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubStreamStatus {
    /// No text yet.
    Pending,
    Streaming,
    /// Terminal with content.
    Done,
    /// Terminal error; region emptied even if text had arrived.
    Cleared,
}

impl SubStreamStatus {
    fn is_closed(self) -> bool {
        matches!(self, Self::Done | Self::Cleared)
    }
}

pub(super) struct SubStream {
    pub(super) kind: SubStreamKind,
    pub(super) sink: NodeSink,
    pub(super) handle: Option<StreamHandle>,
    pub(super) status: SubStreamStatus,
    resize: ResizeTracker,
}

impl SubStream {
    pub(super) fn new(kind: SubStreamKind, sink: NodeSink) -> Self {
        Self {
            kind,
            sink,
            handle: None,
            status: SubStreamStatus::Pending,
            resize: ResizeTracker::default(),
        }
    }

    fn tag(&self) -> Option<RequestTag> {
        self.handle.as_ref().map(StreamHandle::tag)
    }
}

/// One visual overlay and its sub-streams.
pub struct Overlay {
    pub(super) id: OverlayId,
    pub(super) class: OverlayClass,
    pub(super) root: NodeId,
    pub(super) anchor: NodeId,
    pub(super) state: Cell<OverlayState>,
    pub(super) streams: RefCell<Vec<SubStream>>,
    pub(super) width: Cell<f64>,
    anchor_lost: Cell<bool>,
    manager: Weak<ManagerInner>,
}

impl Overlay {
    pub(super) fn new(
        id: OverlayId,
        class: OverlayClass,
        root: NodeId,
        anchor: NodeId,
        streams: Vec<SubStream>,
        width: f64,
        manager: Weak<ManagerInner>,
    ) -> Self {
        Self {
            id,
            class,
            root,
            anchor,
            state: Cell::new(OverlayState::Unborn),
            streams: RefCell::new(streams),
            width: Cell::new(width),
            anchor_lost: Cell::new(false),
            manager,
        }
    }

    pub fn id(&self) -> OverlayId {
        self.id
    }

    pub fn class(&self) -> OverlayClass {
        self.class
    }

    pub fn state(&self) -> OverlayState {
        self.state.get()
    }

    pub fn is_visible(&self) -> bool {
        self.state.get().is_visible()
    }

    /// Container node the overlay renders into.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Word span (popup) or paragraph element (block).
    pub fn anchor(&self) -> NodeId {
        self.anchor
    }

    /// Current width in pixels.
    pub fn width(&self) -> f64 {
        self.width.get()
    }

    /// Whether the paragraph anchor vanished while streaming.
    pub fn is_anchor_lost(&self) -> bool {
        self.anchor_lost.get()
    }

    pub fn kinds(&self) -> Vec<SubStreamKind> {
        self.streams.borrow().iter().map(|s| s.kind).collect()
    }

    pub fn status(&self, kind: SubStreamKind) -> Option<SubStreamStatus> {
        self.streams.borrow().iter().find(|s| s.kind == kind).map(|s| s.status)
    }

    /// Node a sub-stream renders into.
    pub fn slot(&self, kind: SubStreamKind) -> Option<NodeId> {
        self.streams.borrow().iter().find(|s| s.kind == kind).map(|s| s.sink.node())
    }

    /// Tags of every bound sub-stream.
    pub fn tags(&self) -> Vec<RequestTag> {
        self.streams.borrow().iter().filter_map(SubStream::tag).collect()
    }

    /// Weak subscriber handle for the correlator.
    pub fn subscriber(self: &Rc<Self>) -> Weak<dyn StreamSubscriber> {
        Rc::downgrade(self) as Weak<dyn StreamSubscriber>
    }

    /// Attach the request feeding `kind`.
    ///
    /// A destroyed overlay (or one without that sub-stream) cancels the
    /// handle right away. A handle already bound to `kind` is cancelled and
    /// replaced.
    pub fn bind(&self, kind: SubStreamKind, handle: StreamHandle) {
        if self.state.get() == OverlayState::Destroyed {
            handle.cancel();
            return;
        }
        let previous = {
            let mut streams = self.streams.borrow_mut();
            match streams.iter_mut().find(|s| s.kind == kind) {
                Some(stream) => stream.handle.replace(handle),
                None => {
                    tracing::warn!(overlay = %self.id, kind = kind.label(), "bind to missing sub-stream");
                    Some(handle)
                }
            }
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// Cancel every bound request. Idempotent.
    pub(super) fn cancel_all(&self) {
        let handles: Vec<StreamHandle> = self
            .streams
            .borrow()
            .iter()
            .filter_map(|s| s.handle.clone())
            .collect();
        for handle in handles {
            handle.cancel();
        }
    }

    /// Text currently rendered per sub-stream.
    pub(super) fn rendered(&self, manager: &ManagerInner) -> Vec<(SubStreamKind, String)> {
        self.streams
            .borrow()
            .iter()
            .map(|s| (s.kind, manager.doc.text_content(s.sink.node())))
            .collect()
    }

    fn check_anchor(&self, manager: &ManagerInner) {
        if self.class == OverlayClass::Paragraph
            && !self.anchor_lost.get()
            && !manager.doc.is_connected(self.anchor)
        {
            self.anchor_lost.set(true);
            tracing::debug!(overlay = %self.id, anchor = %self.anchor, "paragraph anchor gone, rendering in place");
        }
    }

    /// Re-derive width from the accumulated text. Width only, never position.
    fn refit(&self, manager: &ManagerInner) {
        let total: usize = self.streams.borrow().iter().map(|s| s.sink.chars()).sum();
        let policy = &manager.config.width;
        let width = policy.fitted_width(total, manager.doc.viewport(), manager.config.popup_gap);
        if (width - self.width.get()).abs() >= 1.0 {
            self.width.set(width);
            manager.doc.set_style(self.root, "width", &format!("{width}px"));
        }
    }

    /// After a terminal event: finalize, or destroy when nothing is left to show.
    fn settle(&self, manager: &ManagerInner) {
        let (all_closed, all_cleared) = {
            let streams = self.streams.borrow();
            (
                streams.iter().all(|s| s.status.is_closed()),
                streams.iter().all(|s| s.status == SubStreamStatus::Cleared),
            )
        };
        if !all_closed {
            return;
        }
        if all_cleared {
            tracing::debug!(overlay = %self.id, "every sub-stream failed empty, destroying");
            manager.destroy(self);
            return;
        }
        self.state.set(OverlayState::Finalized);
        manager.finalized(self);
    }
}

impl StreamSubscriber for Overlay {
    fn on_delta(&self, tag: RequestTag, text: &str) {
        if self.state.get() == OverlayState::Destroyed {
            return;
        }
        let Some(manager) = self.manager.upgrade() else { return };
        self.check_anchor(&manager);

        let refit = {
            let mut streams = self.streams.borrow_mut();
            let Some(stream) = streams.iter_mut().find(|s| s.tag() == Some(tag)) else {
                return;
            };
            if stream.status.is_closed() {
                return;
            }
            stream.status = SubStreamStatus::Streaming;
            stream.sink.append_text(text);
            stream.resize.record(text.chars().count(), &manager.config.width)
        };
        self.state.set(OverlayState::Updating);
        if refit {
            self.refit(&manager);
        }
    }

    fn on_done(&self, tag: RequestTag, full_text: &str) {
        if self.state.get() == OverlayState::Destroyed {
            return;
        }
        let Some(manager) = self.manager.upgrade() else { return };
        {
            let mut streams = self.streams.borrow_mut();
            let Some(stream) = streams.iter_mut().find(|s| s.tag() == Some(tag)) else {
                return;
            };
            // Nothing streamed: show the accumulated text in one go.
            if stream.sink.chars() == 0 && !full_text.is_empty() {
                stream.sink.fill(full_text);
            }
            stream.status = SubStreamStatus::Done;
            stream.sink.finalize();
        }
        self.refit(&manager);
        self.settle(&manager);
    }

    fn on_error(&self, tag: RequestTag, message: &str, code: Option<i64>) {
        if self.state.get() == OverlayState::Destroyed {
            return;
        }
        let Some(manager) = self.manager.upgrade() else { return };
        let kind = {
            let mut streams = self.streams.borrow_mut();
            let Some(stream) = streams.iter_mut().find(|s| s.tag() == Some(tag)) else {
                return;
            };
            // Errors always empty the region, partial text included.
            stream.status = SubStreamStatus::Cleared;
            stream.sink.clear();
            stream.kind
        };

        tracing::warn!(overlay = %self.id, kind = kind.label(), code = ?code, %message, "sub-stream failed");
        if manager.config.is_quota_code(code) {
            manager.notifier.notify(message, Severity::Quota);
        } else {
            manager
                .notifier
                .notify(&format!("{} failed: {message}", kind.label()), Severity::Error);
        }
        self.settle(&manager);
    }
}

impl std::fmt::Debug for Overlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overlay")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("state", &self.state.get())
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
