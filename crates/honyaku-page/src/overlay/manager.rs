use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::instance::{Overlay, SubStream, SubStreamStatus};
use super::layout::{block_above, clamp_position};
use super::{OverlayClass, OverlayId, OverlayState, SubStreamKind};
use crate::collaborators::Notifier;
use crate::config::PageConfig;
use crate::dom::{Document, NodeId, Rect};
use crate::sink::{NodeSink, RenderSink};

const POPUP_CLASS: &str = "honyaku-popup";
const PARAGRAPH_CLASS: &str = "honyaku-paragraph";

/// Content of a finalized popup, kept so its word span can re-open it.
#[derive(Debug, Clone)]
struct SavedPopup {
    content: Vec<(SubStreamKind, String)>,
}

pub(crate) struct ManagerInner {
    pub(crate) doc: Rc<dyn Document>,
    pub(crate) config: Rc<PageConfig>,
    pub(crate) notifier: Rc<dyn Notifier>,
    current_popup: RefCell<Option<Rc<Overlay>>>,
    paragraphs: RefCell<HashMap<NodeId, Rc<Overlay>>>,
    saved: RefCell<HashMap<NodeId, SavedPopup>>,
    next_id: Cell<u64>,
}

impl ManagerInner {
    fn next_id(&self) -> OverlayId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        OverlayId(id)
    }

    /// Tear an overlay down. Idempotent.
    pub(crate) fn destroy(&self, overlay: &Overlay) {
        if overlay.state.replace(OverlayState::Destroyed) == OverlayState::Destroyed {
            return;
        }
        overlay.cancel_all();
        self.doc.remove(overlay.root);

        let popup = {
            let mut slot = self.current_popup.borrow_mut();
            if slot.as_ref().is_some_and(|p| p.id == overlay.id) { slot.take() } else { None }
        };
        let paragraph = {
            let mut paragraphs = self.paragraphs.borrow_mut();
            if paragraphs.get(&overlay.anchor).is_some_and(|p| p.id == overlay.id) {
                paragraphs.remove(&overlay.anchor)
            } else {
                None
            }
        };
        tracing::debug!(overlay = %overlay.id, class = ?overlay.class, "overlay destroyed");
        drop((popup, paragraph));
    }

    pub(crate) fn finalized(&self, overlay: &Overlay) {
        tracing::debug!(overlay = %overlay.id, "overlay finalized");
        if overlay.class == OverlayClass::Popup {
            let content = overlay.rendered(self);
            self.saved.borrow_mut().insert(overlay.anchor, SavedPopup { content });
        }
    }

    /// Create the hidden root and its sub-stream slots.
    fn build(&self, class_name: &str, kinds: &[SubStreamKind], width: f64) -> (NodeId, Vec<SubStream>) {
        let doc = &self.doc;
        let root = doc.create_element("div", class_name);
        doc.set_style(root, "visibility", "hidden");
        doc.set_style(root, "width", &format!("{width}px"));
        let streams = kinds
            .iter()
            .map(|kind| {
                let node = doc.create_element("div", kind.class_name());
                doc.append_child(root, node);
                SubStream::new(*kind, NodeSink::new(Rc::clone(doc), node))
            })
            .collect();
        (root, streams)
    }
}

/// Owns every overlay on the page and the "currently shown popup" slot.
#[derive(Clone)]
pub struct OverlayManager {
    inner: Rc<ManagerInner>,
}

impl OverlayManager {
    pub fn new(doc: Rc<dyn Document>, config: Rc<PageConfig>, notifier: Rc<dyn Notifier>) -> Self {
        Self {
            inner: Rc::new(ManagerInner {
                doc,
                config,
                notifier,
                current_popup: RefCell::new(None),
                paragraphs: RefCell::new(HashMap::new()),
                saved: RefCell::new(HashMap::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    pub fn document(&self) -> &Rc<dyn Document> {
        &self.inner.doc
    }

    /// Show a popup anchored to `anchor`, replacing the current one.
    pub fn open_popup(&self, anchor: NodeId, kinds: &[SubStreamKind], expected_chars: usize) -> Rc<Overlay> {
        let inner = &self.inner;
        let doc = &inner.doc;
        let config = &inner.config;
        let viewport = doc.viewport();

        let width = config.width.fitted_width(expected_chars, viewport, config.popup_gap);
        let (root, streams) = inner.build(POPUP_CLASS, kinds, width);
        let overlay = Rc::new(Overlay::new(
            inner.next_id(),
            OverlayClass::Popup,
            root,
            anchor,
            streams,
            width,
            Rc::downgrade(inner),
        ));

        doc.set_style(root, "position", "absolute");
        doc.append_child(doc.body(), root);
        overlay.state.set(OverlayState::Positioning);

        let size = doc.measure(root);
        let anchor_rect = doc
            .bounding_rect(anchor)
            .unwrap_or(Rect::new(viewport.scroll_x, viewport.scroll_y, 0.0, 0.0));
        let position = clamp_position(anchor_rect, size, viewport, config.popup_gap);
        doc.set_style(root, "left", &format!("{}px", position.x));
        doc.set_style(root, "top", &format!("{}px", position.y));

        // Check-and-set of the slot happens without yielding.
        let previous = inner.current_popup.borrow_mut().replace(Rc::clone(&overlay));
        if let Some(previous) = previous
            && previous.id != overlay.id
        {
            tracing::debug!(previous = %previous.id, next = %overlay.id, "popup superseded");
            inner.destroy(&previous);
        }

        doc.set_style(root, "visibility", "visible");
        overlay.state.set(OverlayState::Visible);
        tracing::debug!(overlay = %overlay.id, x = position.x, y = position.y, width, "popup visible");
        overlay
    }

    /// Show an inline block for `paragraph` in place of `placeholder`.
    pub fn open_paragraph(&self, paragraph: NodeId, placeholder: NodeId, expected_chars: usize) -> Rc<Overlay> {
        let inner = &self.inner;
        let doc = &inner.doc;
        let config = &inner.config;
        let viewport = doc.viewport();

        let existing = inner.paragraphs.borrow().get(&paragraph).cloned();
        if let Some(existing) = existing {
            inner.destroy(&existing);
        }

        let width = config.width.fitted_width(expected_chars, viewport, config.popup_gap);
        let (root, streams) = inner.build(PARAGRAPH_CLASS, &[SubStreamKind::Translation], width);
        let overlay = Rc::new(Overlay::new(
            inner.next_id(),
            OverlayClass::Paragraph,
            root,
            paragraph,
            streams,
            width,
            Rc::downgrade(inner),
        ));

        if doc.is_connected(placeholder) {
            doc.replace_node(placeholder, root);
        } else {
            doc.insert_after(paragraph, root);
        }
        overlay.state.set(OverlayState::Positioning);

        // In-flow block: the layout pass narrows it to the viewport and may
        // move it above the paragraph.
        let mut size = doc.measure(root);
        let available = viewport.width - 2.0 * config.popup_gap;
        if size.width > available {
            size.height *= size.width / available;
            size.width = available;
            overlay.width.set(available);
            doc.set_style(root, "width", &format!("{available}px"));
        }
        if let Some(rect) = doc.bounding_rect(paragraph)
            && block_above(rect, size, viewport, config.popup_gap)
        {
            doc.insert_before(paragraph, root);
            tracing::debug!(overlay = %overlay.id, paragraph = %paragraph, "paragraph block flipped above");
        }

        inner.paragraphs.borrow_mut().insert(paragraph, Rc::clone(&overlay));
        doc.set_style(root, "visibility", "visible");
        overlay.state.set(OverlayState::Visible);
        tracing::debug!(overlay = %overlay.id, paragraph = %paragraph, "paragraph block visible");
        overlay
    }

    /// Re-show a finalized popup from its word span without a new request.
    pub fn reopen(&self, span: NodeId) -> Option<Rc<Overlay>> {
        let saved = self.inner.saved.borrow().get(&span).cloned()?;
        let kinds: Vec<SubStreamKind> = saved.content.iter().map(|(kind, _)| *kind).collect();
        let chars = saved.content.iter().map(|(_, text)| text.chars().count()).sum();

        let overlay = self.open_popup(span, &kinds, chars);
        {
            let mut streams = overlay.streams.borrow_mut();
            for (stream, (_, text)) in streams.iter_mut().zip(&saved.content) {
                if text.is_empty() {
                    stream.sink.clear();
                    stream.status = SubStreamStatus::Cleared;
                } else {
                    stream.sink.fill(text);
                    stream.sink.finalize();
                    stream.status = SubStreamStatus::Done;
                }
            }
        }
        overlay.state.set(OverlayState::Finalized);
        tracing::debug!(overlay = %overlay.id, span = %span, "popup reopened");
        Some(overlay)
    }

    /// Whether `span` has a finalized popup to re-open.
    pub fn can_reopen(&self, span: NodeId) -> bool {
        self.inner.saved.borrow().contains_key(&span)
    }

    pub fn destroy(&self, overlay: &Overlay) {
        self.inner.destroy(overlay);
    }

    /// User dismissal (click outside, close button) of the current popup.
    pub fn dismiss(&self) -> bool {
        let current = self.inner.current_popup.borrow().clone();
        match current {
            Some(popup) => {
                self.inner.destroy(&popup);
                true
            }
            None => false,
        }
    }

    pub fn current_popup(&self) -> Option<Rc<Overlay>> {
        self.inner.current_popup.borrow().clone()
    }

    pub fn paragraph_overlay(&self, paragraph: NodeId) -> Option<Rc<Overlay>> {
        self.inner.paragraphs.borrow().get(&paragraph).cloned()
    }

    /// Destroy everything (page unload).
    pub fn clear(&self) {
        self.dismiss();
        let paragraphs: Vec<Rc<Overlay>> = self.inner.paragraphs.borrow().values().cloned().collect();
        for overlay in paragraphs {
            self.inner.destroy(&overlay);
        }
    }
}
