//! In-memory [`Document`] arena.
//!
//! Nodes are never freed; removing one only unlinks it, so ids held by
//! overlays stay valid after the page drops them (which is exactly the
//! anchor-loss situation the overlay must survive). Every mutating call bumps
//! a counter that tests use to assert that nothing touched the tree.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::dom::{Document, NodeId, Rect, Size, TextSelection, Viewport};

/// Average glyph advance used by [`MemoryDocument::measure`].
const CHAR_WIDTH: f64 = 8.0;
const LINE_HEIGHT: f64 = 20.0;
const PADDING: f64 = 16.0;
const DEFAULT_WIDTH: f64 = 200.0;

#[derive(Debug, Default)]
struct Node {
    tag: Option<String>,
    class: String,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    styles: BTreeMap<String, String>,
    attributes: BTreeMap<String, String>,
    rect: Option<Rect>,
}

#[derive(Debug)]
struct Arena {
    nodes: Vec<Node>,
    selection: Option<TextSelection>,
    viewport: Viewport,
    mutations: usize,
    layout_passes: usize,
}

impl Arena {
    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize)
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn unlink(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).and_then(|n| n.parent) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != id);
        }
        if let Some(n) = self.node_mut(id) {
            n.parent = None;
        }
    }

    fn insert_at(&mut self, parent: NodeId, index: usize, id: NodeId) {
        self.unlink(id);
        if let Some(p) = self.node_mut(parent) {
            let index = index.min(p.children.len());
            p.children.insert(index, id);
        }
        if let Some(n) = self.node_mut(id) {
            n.parent = Some(parent);
        }
    }

    fn position(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.node(id)?.parent?;
        let index = self.node(parent)?.children.iter().position(|c| *c == id)?;
        Some((parent, index))
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if let Some(node) = self.node(id) {
            out.push_str(&node.text);
            for child in &node.children {
                self.collect_text(*child, out);
            }
        }
    }
}

/// Arena-backed document for tests and headless use.
#[derive(Debug)]
pub struct MemoryDocument {
    arena: RefCell<Arena>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new(Viewport::new(1280.0, 800.0))
    }
}

impl MemoryDocument {
    /// Empty document with a `body` root.
    pub fn new(viewport: Viewport) -> Self {
        let body = Node {
            tag: Some("body".into()),
            rect: Some(Rect::new(0.0, 0.0, viewport.width, viewport.height)),
            ..Node::default()
        };
        Self {
            arena: RefCell::new(Arena {
                nodes: vec![body],
                selection: None,
                viewport,
                mutations: 0,
                layout_passes: 0,
            }),
        }
    }

    // ── builders (do not count as mutations) ─────────────────────────────

    /// Append a new element under `parent`.
    pub fn element(&self, parent: NodeId, tag: &str) -> NodeId {
        let mut arena = self.arena.borrow_mut();
        let id = arena.push(Node {
            tag: Some(tag.to_ascii_lowercase()),
            ..Node::default()
        });
        arena.insert_at(parent, usize::MAX, id);
        id
    }

    /// Append a text node under `parent`.
    pub fn text(&self, parent: NodeId, text: &str) -> NodeId {
        let mut arena = self.arena.borrow_mut();
        let id = arena.push(Node {
            text: text.to_string(),
            ..Node::default()
        });
        arena.insert_at(parent, usize::MAX, id);
        id
    }

    pub fn set_rect(&self, node: NodeId, rect: Rect) {
        if let Some(n) = self.arena.borrow_mut().node_mut(node) {
            n.rect = Some(rect);
        }
    }

    /// Select `text` starting in `anchor`.
    pub fn select(&self, anchor: NodeId, text: &str, rect: Rect) {
        self.arena.borrow_mut().selection = Some(TextSelection {
            text: text.to_string(),
            anchor,
            rect,
        });
    }

    pub fn clear_selection(&self) {
        self.arena.borrow_mut().selection = None;
    }

    // ── inspection ───────────────────────────────────────────────────────

    pub fn style(&self, node: NodeId, property: &str) -> Option<String> {
        self.arena.borrow().node(node)?.styles.get(property).cloned()
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.arena.borrow().node(node)?.attributes.get(name).cloned()
    }

    pub fn class_of(&self, node: NodeId) -> String {
        self.arena
            .borrow()
            .node(node)
            .map(|n| n.class.clone())
            .unwrap_or_default()
    }

    /// Connected nodes carrying `class`, in document order.
    pub fn find_by_class(&self, class: &str) -> Vec<NodeId> {
        let arena = self.arena.borrow();
        let mut found = Vec::new();
        let mut stack = vec![NodeId(0)];
        while let Some(id) = stack.pop() {
            let Some(node) = arena.node(id) else { continue };
            if node.class.split_whitespace().any(|c| c == class) {
                found.push(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        found
    }

    /// Number of mutating calls made through [`Document`].
    pub fn mutation_count(&self) -> usize {
        self.arena.borrow().mutations
    }

    /// Number of [`Document::measure`] calls.
    pub fn layout_passes(&self) -> usize {
        self.arena.borrow().layout_passes
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Arena) -> R) -> R {
        let mut arena = self.arena.borrow_mut();
        arena.mutations += 1;
        f(&mut arena)
    }
}

fn parse_px(value: &str) -> Option<f64> {
    value.trim().trim_end_matches("px").parse().ok()
}

impl Document for MemoryDocument {
    fn body(&self) -> NodeId {
        NodeId(0)
    }

    fn selection(&self) -> Option<TextSelection> {
        self.arena.borrow().selection.clone()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena.borrow().node(node)?.parent
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.arena.borrow().node(node)?.tag.clone()
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.arena.borrow().collect_text(node, &mut out);
        out
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.arena
            .borrow()
            .node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn is_connected(&self, node: NodeId) -> bool {
        let arena = self.arena.borrow();
        let mut current = node;
        loop {
            if current == NodeId(0) {
                return true;
            }
            match arena.node(current).and_then(|n| n.parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn bounding_rect(&self, node: NodeId) -> Option<Rect> {
        let (rect, left, top) = {
            let arena = self.arena.borrow();
            let n = arena.node(node)?;
            (
                n.rect,
                n.styles.get("left").and_then(|v| parse_px(v)),
                n.styles.get("top").and_then(|v| parse_px(v)),
            )
        };
        if rect.is_some() {
            return rect;
        }
        let (x, y) = (left?, top?);
        let size = self.measure(node);
        Some(Rect::new(x, y, size.width, size.height))
    }

    fn viewport(&self) -> Viewport {
        self.arena.borrow().viewport
    }

    fn create_element(&self, tag: &str, class: &str) -> NodeId {
        self.mutate(|arena| {
            arena.push(Node {
                tag: Some(tag.to_ascii_lowercase()),
                class: class.to_string(),
                ..Node::default()
            })
        })
    }

    fn append_child(&self, parent: NodeId, child: NodeId) {
        self.mutate(|arena| arena.insert_at(parent, usize::MAX, child));
    }

    fn insert_after(&self, reference: NodeId, node: NodeId) {
        self.mutate(|arena| {
            if let Some((parent, index)) = arena.position(reference) {
                arena.insert_at(parent, index + 1, node);
            }
        });
    }

    fn insert_before(&self, reference: NodeId, node: NodeId) {
        self.mutate(|arena| {
            // Unlink first so moving a later sibling forward keeps the index right.
            arena.unlink(node);
            if let Some((parent, index)) = arena.position(reference) {
                arena.insert_at(parent, index, node);
            }
        });
    }

    fn replace_node(&self, old: NodeId, new: NodeId) {
        self.mutate(|arena| {
            if let Some((parent, index)) = arena.position(old) {
                arena.unlink(old);
                arena.insert_at(parent, index, new);
            }
        });
    }

    fn remove(&self, node: NodeId) {
        self.mutate(|arena| arena.unlink(node));
    }

    fn append_text(&self, node: NodeId, text: &str) {
        self.mutate(|arena| {
            if let Some(n) = arena.node_mut(node) {
                n.text.push_str(text);
            }
        });
    }

    fn set_text(&self, node: NodeId, text: &str) {
        self.mutate(|arena| {
            let children = match arena.node_mut(node) {
                Some(n) => {
                    n.text = text.to_string();
                    std::mem::take(&mut n.children)
                }
                None => return,
            };
            for child in children {
                if let Some(c) = arena.node_mut(child) {
                    c.parent = None;
                }
            }
        });
    }

    fn set_style(&self, node: NodeId, property: &str, value: &str) {
        self.mutate(|arena| {
            if let Some(n) = arena.node_mut(node) {
                n.styles.insert(property.to_string(), value.to_string());
            }
        });
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        self.mutate(|arena| {
            if let Some(n) = arena.node_mut(node) {
                n.attributes.insert(name.to_string(), value.to_string());
            }
        });
    }

    fn wrap_selection(&self, selection: &TextSelection, tag: &str, class: &str) -> Option<NodeId> {
        self.mutate(|arena| {
            let anchor = arena.node(selection.anchor)?;
            let span = Node {
                tag: Some(tag.to_ascii_lowercase()),
                class: class.to_string(),
                text: selection.text.clone(),
                rect: Some(selection.rect),
                ..Node::default()
            };

            // Text node holding the selection: split it around the new element.
            if anchor.tag.is_none() {
                let split = anchor.text.find(&selection.text);
                let (parent, index) = arena.position(selection.anchor)?;
                let span = arena.push(span);
                if let Some(at) = split {
                    let original = arena.node(selection.anchor)?.text.clone();
                    let after = original[at + selection.text.len()..].to_string();
                    if let Some(n) = arena.node_mut(selection.anchor) {
                        n.text = original[..at].to_string();
                    }
                    arena.insert_at(parent, index + 1, span);
                    if !after.is_empty() {
                        let tail = arena.push(Node { text: after, ..Node::default() });
                        arena.insert_at(parent, index + 2, tail);
                    }
                } else {
                    arena.insert_at(parent, index + 1, span);
                }
                return Some(span);
            }

            let span = arena.push(span);
            arena.insert_at(selection.anchor, usize::MAX, span);
            Some(span)
        })
    }

    fn measure(&self, node: NodeId) -> Size {
        let text = self.text_content(node);
        let mut arena = self.arena.borrow_mut();
        arena.layout_passes += 1;
        let Some(n) = arena.node(node) else {
            return Size::default();
        };
        let width = n
            .styles
            .get("width")
            .and_then(|v| parse_px(v))
            .or(n.rect.map(|r| r.width))
            .unwrap_or(DEFAULT_WIDTH);
        let height = match n.styles.get("height").and_then(|v| parse_px(v)) {
            Some(h) => h,
            None => {
                let per_line = ((width - PADDING) / CHAR_WIDTH).max(1.0);
                let lines = (text.chars().count() as f64 / per_line).ceil().max(1.0);
                lines * LINE_HEIGHT + PADDING
            }
        };
        Size { width, height }
    }
}
