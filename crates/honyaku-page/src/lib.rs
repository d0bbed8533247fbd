//! Page-side agent.
//!
//! Receives relayed stream events, routes them by request tag to overlay
//! sub-streams, and turns user selections into requests. Single threaded:
//! the page context is one cooperative event loop, so shared state is
//! `Rc`/`RefCell` and is only mutated within one loop turn.
//!
//! The host document is reached through [`Document`]; [`MemoryDocument`] is
//! the in-process implementation.

pub mod agent;
pub mod client;
pub mod collaborators;
pub mod config;
pub mod correlator;
pub mod dom;
pub mod memory;
pub mod orchestrator;
pub mod overlay;
pub mod paragraph;
pub mod sink;

pub use agent::PageAgent;
pub use client::{RelayClient, StreamHandle};
pub use collaborators::{
    CorrectionError, Corrector, Notifier, PromptComposer, Severity, Speaker, TemplatePrompts,
};
pub use config::{DEFAULT_QUOTA_ERROR_CODES, PageConfig, PageConfigError};
pub use correlator::{Correlator, CorrelatorStats, Registration, StreamSubscriber};
pub use dom::{Document, NodeId, Point, Rect, Size, TextSelection, Viewport};
pub use memory::MemoryDocument;
pub use orchestrator::{Collaborators, Orchestrator, TriggerOutcome};
pub use overlay::{
    Overlay, OverlayClass, OverlayId, OverlayManager, OverlayState, SubStreamKind, SubStreamStatus,
};
pub use paragraph::{ParagraphRules, SelectionMode, decide_mode, resolve_container};
pub use sink::{NodeSink, RenderSink};
