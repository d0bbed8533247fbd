//! Shared types for honyaku.
//!
//! This crate is the leaf everything else builds on: correlation ids, the
//! decoded stream event, and the messages that cross the boundary between the
//! background relay and page contexts. It has **no internal honyaku
//! dependencies**.
//!
//! ```text
//! Page context (PageContextId)
//!     └── mints RequestTag per sub-stream
//!     └── posts ClientToBackground::StartStream { tag, .. }
//!
//! Background relay
//!     └── decodes upstream frames into StreamEvent { tag, .. }
//!     └── sends BackgroundToClient back to the originating PageContextId
//! ```

pub mod event;
pub mod ids;
pub mod wire;

pub use event::StreamEvent;
pub use ids::{PageContextId, RequestTag};
pub use wire::{BackgroundToClient, ClientToBackground, Envelope, PromptPayload};
