//! Overlay lifecycle.
//!
//! ```text
//!   Unborn ──▶ Positioning ──▶ Visible ──▶ Updating* ──▶ Finalized
//!                                 │            │
//!                                 └────────────┴──────────▶ Destroyed
//! ```
//!
//! An overlay hosts one or more sub-streams (translation, explanation), each
//! fed by its own request tag. Popups are exclusive: the manager owns the only
//! "currently shown" slot and destroys its occupant before showing another.
//! Paragraph blocks are not exclusive, but a paragraph gets at most one.
//!
//! Destroying an overlay cancels every sub-stream handle it owns (finished
//! ones included, which is a no-op), detaches its DOM and clears the slot.

pub mod layout;
mod instance;
mod manager;

pub use instance::{Overlay, SubStreamStatus};
pub use layout::{ResizeTracker, WidthPolicy, block_above, clamp_position};
pub use manager::OverlayManager;

use std::fmt;

/// Identifies one overlay for the lifetime of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayId(pub u64);

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overlay-{}", self.0)
    }
}

/// Exclusivity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayClass {
    /// Word-anchored floating box. At most one visible.
    Popup,
    /// Inline block after a paragraph.
    Paragraph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Unborn,
    Positioning,
    Visible,
    Updating,
    Finalized,
    Destroyed,
}

impl OverlayState {
    /// On screen.
    pub fn is_visible(self) -> bool {
        matches!(self, Self::Visible | Self::Updating | Self::Finalized)
    }
}

/// What a sub-stream renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubStreamKind {
    Translation,
    Explanation,
}

impl SubStreamKind {
    pub fn class_name(self) -> &'static str {
        match self {
            Self::Translation => "honyaku-translation",
            Self::Explanation => "honyaku-explanation",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Translation => "translation",
            Self::Explanation => "explanation",
        }
    }
}
