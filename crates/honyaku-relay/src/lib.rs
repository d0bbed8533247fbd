//! Background streaming relay.
//!
//! ```text
//!   BackgroundInbox ──▶ RelayHub ──▶ RelaySession (one per RequestTag)
//!                                        │
//!                          PromptTransport::submit ──▶ upstream
//!                                        │ body bytes
//!                                        ▼
//!                                   ChunkDecoder ──▶ StreamEvent
//!                                        │
//!                          MessageChannel::send(destination)
//! ```
//!
//! Sessions share nothing but the channel. Each one owns its decoder, its
//! upstream response and its cancellation token.

pub mod config;
pub mod constants;
pub mod decoder;
pub mod hub;
pub mod session;
pub mod transport;

pub use config::{ConfigError, RelayConfig};
pub use decoder::ChunkDecoder;
pub use hub::RelayHub;
pub use session::{
    RelayRequest, RelaySession, SessionHandle, SessionOptions, SessionOutcome, parse_error_body,
};
pub use transport::{ByteStream, HttpTransport, PromptTransport, TransportError, TransportResponse};
