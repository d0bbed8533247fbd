//! Native-messaging host for honyaku.
//!
//! The browser launches `honyaku-host` and talks to it over stdio with
//! length-prefixed JSON frames. Inside, a [`RelayHub`](honyaku_relay::RelayHub)
//! serves every page context through one
//! [`MessageChannel`](honyaku_channel::MessageChannel); [`Host`] only moves
//! frames between stdio and the channel.

pub mod frame;
pub mod host;

pub use frame::{FrameCodec, HostCommand, HostError, MAX_FRAME_BYTES, encode_outbound};
pub use host::{Host, HostStats};
