//! Container resolution and word/paragraph mode decision.
//!
//! Both are pure functions over a [`Document`] so they can be tested without
//! an overlay or a relay.

use serde::Deserialize;

use crate::dom::{Document, NodeId};

/// Thresholds for the ancestor walk in [`resolve_container`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParagraphRules {
    /// An ancestor whose text reaches this many characters is the container.
    pub min_text_len: usize,
    /// Tags that are paragraph-like on their own.
    pub paragraph_tags: Vec<String>,
    /// An ancestor with at least this many non-empty text children is the container.
    pub min_text_children: usize,
    /// Section-sized tags the walk never enters.
    pub boundary_tags: Vec<String>,
}

impl Default for ParagraphRules {
    fn default() -> Self {
        let tags = |list: &[&str]| list.iter().map(|t| t.to_string()).collect();
        Self {
            min_text_len: 30,
            paragraph_tags: tags(&[
                "p", "li", "blockquote", "dd", "dt", "td", "h1", "h2", "h3", "h4", "h5", "h6",
                "figcaption", "pre",
            ]),
            min_text_children: 2,
            boundary_tags: tags(&["article", "section", "main", "body", "html"]),
        }
    }
}

impl ParagraphRules {
    fn is_paragraph_tag(&self, tag: &str) -> bool {
        self.paragraph_tags.iter().any(|t| t == tag)
    }

    fn is_boundary_tag(&self, tag: &str) -> bool {
        self.boundary_tags.iter().any(|t| t == tag)
    }
}

/// Nearest paragraph-like ancestor of `start`.
///
/// Walks up from the first element at or above `start`. Stops at the first
/// ancestor that has a paragraph-like tag, enough text, or several text-bearing
/// children. A boundary tag (`article`, `section`, ...) is never returned when
/// a smaller element was passed on the way up.
pub fn resolve_container(doc: &dyn Document, start: NodeId, rules: &ParagraphRules) -> Option<NodeId> {
    let mut current = if doc.tag_name(start).is_some() { start } else { doc.parent(start)? };
    let mut previous: Option<NodeId> = None;

    loop {
        let tag = doc.tag_name(current).unwrap_or_default();
        if rules.is_boundary_tag(&tag) {
            return Some(previous.unwrap_or(current));
        }
        if rules.is_paragraph_tag(&tag)
            || doc.text_content(current).trim().chars().count() >= rules.min_text_len
            || text_children(doc, current) >= rules.min_text_children
        {
            return Some(current);
        }
        previous = Some(current);
        match doc.parent(current) {
            Some(parent) => current = parent,
            None => return previous,
        }
    }
}

fn text_children(doc: &dyn Document, node: NodeId) -> usize {
    doc.children(node)
        .into_iter()
        .filter(|c| !doc.text_content(*c).trim().is_empty())
        .count()
}

/// How a selection is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Popup with translation and explanation.
    Word,
    /// Inline block after the paragraph with one translation.
    Paragraph,
}

const SENTENCE_PUNCTUATION: &[char] = &['.', '!', '?', '。', '！', '？', ';', '…'];

/// Paragraph mode if the selection reads like a sentence, covers at least
/// half of the container, or is not contained in it (crosses a boundary).
pub fn decide_mode(selection: &str, container_text: &str) -> SelectionMode {
    let selection = selection.trim();
    if selection.contains(SENTENCE_PUNCTUATION) {
        return SelectionMode::Paragraph;
    }
    let container = container_text.trim();
    if selection.chars().count() * 2 >= container.chars().count() {
        return SelectionMode::Paragraph;
    }
    if !container.contains(selection) {
        return SelectionMode::Paragraph;
    }
    SelectionMode::Word
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDocument;

    #[test]
    fn paragraph_tag_wins_immediately() {
        let doc = MemoryDocument::default();
        let article = doc.element(doc.body(), "article");
        let p = doc.element(article, "p");
        let b = doc.element(p, "b");
        let t = doc.text(b, "kurz");
        assert_eq!(resolve_container(&doc, t, &ParagraphRules::default()), Some(p));
    }

    #[test]
    fn long_text_div_is_container() {
        let doc = MemoryDocument::default();
        let div = doc.element(doc.body(), "div");
        let span = doc.element(div, "span");
        let t = doc.text(span, "short");
        doc.text(div, " and a much longer tail that crosses thirty chars");
        assert_eq!(resolve_container(&doc, t, &ParagraphRules::default()), Some(div));
    }

    #[test]
    fn multiple_text_children_qualify() {
        let doc = MemoryDocument::default();
        let div = doc.element(doc.body(), "div");
        let a = doc.element(div, "span");
        let t = doc.text(a, "uno");
        let b = doc.element(div, "span");
        doc.text(b, "dos");
        assert_eq!(resolve_container(&doc, t, &ParagraphRules::default()), Some(div));
    }

    #[test]
    fn never_walks_into_section() {
        let doc = MemoryDocument::default();
        let section = doc.element(doc.body(), "section");
        let div = doc.element(section, "div");
        let t = doc.text(div, "tiny");
        doc.text(section, &"lots of surrounding section text ".repeat(10));
        assert_eq!(resolve_container(&doc, t, &ParagraphRules::default()), Some(div));
    }

    #[test]
    fn word_inside_long_sentence_is_word_mode() {
        let text = "El gato negro duerme en la silla de la cocina";
        assert_eq!(decide_mode("gato", text), SelectionMode::Word);
    }

    #[test]
    fn punctuation_forces_paragraph() {
        assert_eq!(decide_mode("duerme.", "El gato duerme. Y sueña con peces"), SelectionMode::Paragraph);
        assert_eq!(decide_mode("猫。", "猫。犬。鳥。魚。とても長い文章です"), SelectionMode::Paragraph);
    }

    #[test]
    fn half_coverage_forces_paragraph() {
        assert_eq!(decide_mode("gato negro", "gato negro sí"), SelectionMode::Paragraph);
    }

    #[test]
    fn selection_across_boundary_forces_paragraph() {
        assert_eq!(
            decide_mode("silla cocina", "El gato duerme en la silla de la cocina"),
            SelectionMode::Paragraph
        );
    }
}
