//! Render targets for streamed text.

use std::rc::Rc;

use crate::dom::{Document, NodeId};

/// Attribute recording a sub-stream's render state on its node.
pub const STATE_ATTRIBUTE: &str = "data-state";

/// Where a sub-stream's text goes.
pub trait RenderSink {
    fn append_text(&mut self, text: &str);
    fn clear(&mut self);
    fn finalize(&mut self);
}

/// Writes into one document node.
pub struct NodeSink {
    doc: Rc<dyn Document>,
    node: NodeId,
    chars: usize,
}

impl NodeSink {
    /// Marks the node as loading.
    pub fn new(doc: Rc<dyn Document>, node: NodeId) -> Self {
        doc.set_attribute(node, STATE_ATTRIBUTE, "loading");
        Self { doc, node, chars: 0 }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Characters appended since creation or the last clear.
    pub fn chars(&self) -> usize {
        self.chars
    }

    /// Fill the node at once (no streaming).
    pub fn fill(&mut self, text: &str) {
        self.doc.set_text(self.node, text);
        self.chars = text.chars().count();
    }
}

impl RenderSink for NodeSink {
    fn append_text(&mut self, text: &str) {
        if self.chars == 0 {
            self.doc.set_attribute(self.node, STATE_ATTRIBUTE, "streaming");
        }
        self.doc.append_text(self.node, text);
        self.chars += text.chars().count();
    }

    fn clear(&mut self) {
        self.doc.set_text(self.node, "");
        self.doc.set_attribute(self.node, STATE_ATTRIBUTE, "cleared");
        self.chars = 0;
    }

    fn finalize(&mut self) {
        self.doc.set_attribute(self.node, STATE_ATTRIBUTE, "done");
    }
}
