//! Overlay placement and width.

use serde::Deserialize;

use crate::dom::{Point, Rect, Size, Viewport};

/// Top-left corner that keeps `size` inside `viewport`.
///
/// Starts below-right of the anchor. Overflowing the right edge flips the box
/// to end at the anchor's right edge; overflowing the bottom flips it above
/// the anchor. If neither side fits, the box is pinned to the viewport edge.
pub fn clamp_position(anchor: Rect, size: Size, viewport: Viewport, gap: f64) -> Point {
    let mut x = anchor.x;
    if x + size.width > viewport.right() {
        x = anchor.right() - size.width;
    }
    x = x.min(viewport.right() - size.width).max(viewport.scroll_x);

    let mut y = anchor.bottom() + gap;
    if y + size.height > viewport.bottom() {
        let above = anchor.y - gap - size.height;
        y = if above >= viewport.scroll_y { above } else { viewport.bottom() - size.height };
    }
    y = y.max(viewport.scroll_y);

    Point { x, y }
}

/// Whether an in-flow block that would sit after `paragraph` belongs above it.
///
/// Only when the block overflows the viewport bottom below the paragraph and
/// fits above it.
pub fn block_above(paragraph: Rect, block: Size, viewport: Viewport, gap: f64) -> bool {
    let below = paragraph.bottom() + gap + block.height;
    let above = paragraph.y - gap - block.height;
    below > viewport.bottom() && above >= viewport.scroll_y
}

/// Width derivation and how often to re-derive while streaming.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WidthPolicy {
    pub min_width: f64,
    pub max_width: f64,
    /// Average glyph advance used to turn characters into pixels.
    pub char_width: f64,
    /// Line count the width aims for before growing taller instead of wider.
    pub target_lines: f64,
    /// Re-derive after this many chunks...
    pub every_chunks: usize,
    /// ...or after this many characters, whichever comes first.
    pub every_chars: usize,
}

impl Default for WidthPolicy {
    fn default() -> Self {
        Self {
            min_width: 160.0,
            max_width: 420.0,
            char_width: 8.0,
            target_lines: 4.0,
            every_chunks: 8,
            every_chars: 120,
        }
    }
}

impl WidthPolicy {
    /// Width for `chars` characters of content.
    pub fn optimal_width(&self, chars: usize) -> f64 {
        let ideal = chars as f64 * self.char_width / self.target_lines;
        ideal.clamp(self.min_width, self.max_width).round()
    }

    /// Same, capped to what fits in the viewport.
    pub fn fitted_width(&self, chars: usize, viewport: Viewport, margin: f64) -> f64 {
        self.optimal_width(chars).min((viewport.width - 2.0 * margin).max(self.min_width.min(viewport.width)))
    }
}

/// Counts streamed content between width re-derivations.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResizeTracker {
    chunks: usize,
    chars: usize,
}

impl ResizeTracker {
    /// Record one chunk. Returns `true` when the width should be re-derived.
    pub fn record(&mut self, chars: usize, policy: &WidthPolicy) -> bool {
        self.chunks += 1;
        self.chars += chars;
        if self.chunks >= policy.every_chunks || self.chars >= policy.every_chars {
            *self = Self::default();
            true
        } else {
            false
        }
    }
}
