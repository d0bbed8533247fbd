//! Document abstraction.
//!
//! The page agent never holds DOM objects. It speaks to the host document
//! through [`Document`] using opaque [`NodeId`]s, the same way the native
//! host only ever sees ids on the wire. Methods take `&self`: like the
//! browser DOM, a document is shared and mutated through any handle.
//!
//! [`MemoryDocument`](crate::memory::MemoryDocument) is the in-process
//! implementation used by tests and by headless embedders.

use std::fmt;

/// Opaque handle to a node in a [`Document`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Axis-aligned rectangle in page coordinates (CSS pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Visible part of the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { scroll_x: 0.0, scroll_y: 0.0, width, height }
    }

    pub fn right(&self) -> f64 {
        self.scroll_x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.scroll_y + self.height
    }
}

/// The user's current text selection.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSelection {
    pub text: String,
    /// Node holding the start of the selection (text node or element).
    pub anchor: NodeId,
    /// Bounding box of the selected range.
    pub rect: Rect,
}

impl TextSelection {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Host document operations needed by the overlay and orchestrator.
pub trait Document {
    /// Root element overlays are mounted under.
    fn body(&self) -> NodeId;

    /// Current selection, `None` when nothing is selected.
    fn selection(&self) -> Option<TextSelection>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Lowercase tag name; `None` for text nodes.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    /// Concatenated text of the node and its descendants.
    fn text_content(&self, node: NodeId) -> String;

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Whether the node is still attached to the document tree.
    fn is_connected(&self, node: NodeId) -> bool;

    fn bounding_rect(&self, node: NodeId) -> Option<Rect>;

    fn viewport(&self) -> Viewport;

    /// Create a detached element with a class attribute.
    fn create_element(&self, tag: &str, class: &str) -> NodeId;

    fn append_child(&self, parent: NodeId, child: NodeId);

    /// Insert `node` as the next sibling of `reference`.
    fn insert_after(&self, reference: NodeId, node: NodeId);

    /// Insert `node` as the previous sibling of `reference`.
    fn insert_before(&self, reference: NodeId, node: NodeId);

    /// Put `new` where `old` is and detach `old`.
    fn replace_node(&self, old: NodeId, new: NodeId);

    /// Detach a node (and its subtree) from the document.
    fn remove(&self, node: NodeId);

    fn append_text(&self, node: NodeId, text: &str);

    /// Replace the node's text and drop its children.
    fn set_text(&self, node: NodeId, text: &str);

    fn set_style(&self, node: NodeId, property: &str, value: &str);

    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    /// Wrap the selected range in a new element and return it.
    fn wrap_selection(&self, selection: &TextSelection, tag: &str, class: &str) -> Option<NodeId>;

    /// Force layout and report the node's rendered size.
    fn measure(&self, node: NodeId) -> Size;
}
