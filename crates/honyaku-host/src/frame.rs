//! Stdio framing: a u32 little-endian length, then that many bytes of JSON.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use honyaku_types::{BackgroundToClient, ClientToBackground, Envelope, PageContextId};
use serde::Deserialize;
use tokio_util::codec::{Decoder, Encoder};

/// Largest frame accepted in either direction.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

const HEADER_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("stdio: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
    #[error("frame for {0} carries neither a message nor a detach")]
    EmptyFrame(PageContextId),
}

/// Length-prefixed frame codec.
///
/// An oversized inbound frame is skipped in place, so one bad frame does not
/// end the stream.
#[derive(Debug)]
pub struct FrameCodec {
    max: usize,
    discarding: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_BYTES)
    }
}

impl FrameCodec {
    pub fn new(max: usize) -> Self {
        Self { max, discarding: 0 }
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = HostError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, HostError> {
        loop {
            if self.discarding > 0 {
                let n = self.discarding.min(src.len());
                src.advance(n);
                self.discarding -= n;
                if self.discarding > 0 {
                    return Ok(None);
                }
            }

            if src.len() < HEADER_LEN {
                return Ok(None);
            }
            let len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
            if len > self.max {
                tracing::warn!(len, max = self.max, "oversized frame dropped");
                src.advance(HEADER_LEN);
                self.discarding = len;
                continue;
            }

            let total = HEADER_LEN + len;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }
            src.advance(HEADER_LEN);
            return Ok(Some(src.split_to(len).freeze()));
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = HostError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), HostError> {
        if item.len() > self.max {
            return Err(HostError::FrameTooLarge { len: item.len(), max: self.max });
        }
        dst.reserve(HEADER_LEN + item.len());
        dst.put_u32_le(item.len() as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// What the browser side sends.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    context: PageContextId,
    #[serde(default)]
    message: Option<ClientToBackground>,
    #[serde(default)]
    detach: bool,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Post(Envelope<ClientToBackground>),
    Detach(PageContextId),
}

impl HostCommand {
    pub fn parse(frame: &[u8]) -> Result<Self, HostError> {
        let inbound: InboundFrame = serde_json::from_slice(frame)?;
        if inbound.detach {
            return Ok(Self::Detach(inbound.context));
        }
        match inbound.message {
            Some(message) => Ok(Self::Post(Envelope::new(inbound.context, message))),
            None => Err(HostError::EmptyFrame(inbound.context)),
        }
    }
}

/// Serialize one outbound frame body.
pub fn encode_outbound(envelope: &Envelope<BackgroundToClient>) -> Result<Bytes, HostError> {
    Ok(Bytes::from(serde_json::to_vec(envelope)?))
}
