//! Stdio bridge between the browser and the message channel.
//!
//! ```text
//!   stdin ─▶ FrameCodec ─▶ HostCommand ─┬─ Post ───▶ PageSender::post ─▶ hub inbox
//!                                       └─ Detach ─▶ MessageChannel::detach
//!
//!   PagePort (one pump task per context) ─▶ mpsc ─▶ writer task ─▶ FrameCodec ─▶ stdout
//! ```
//!
//! Contexts attach lazily on their first frame.

use std::collections::HashMap;

use futures::{SinkExt, StreamExt};
use honyaku_channel::{MessageChannel, PageSender};
use honyaku_types::{BackgroundToClient, Envelope, PageContextId};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::frame::{FrameCodec, HostCommand, HostError, encode_outbound};

type Outbound = mpsc::UnboundedSender<Envelope<BackgroundToClient>>;

/// Counters reported when the bridge stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostStats {
    pub frames_in: u64,
    pub frames_out: u64,
    pub rejected: u64,
    pub contexts: u64,
}

struct Attached {
    sender: PageSender,
    pump: JoinHandle<()>,
}

pub struct Host {
    channel: MessageChannel,
    pages: HashMap<PageContextId, Attached>,
    outbound: Outbound,
    stats: HostStats,
}

impl Host {
    /// Serve frames from `input` until it closes, writing replies to `output`.
    pub async fn run<R, W>(channel: MessageChannel, input: R, output: W) -> Result<HostStats, HostError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_frames(rx, output));
        let mut host = Self {
            channel,
            pages: HashMap::new(),
            outbound,
            stats: HostStats::default(),
        };

        let mut frames = FramedRead::new(input, FrameCodec::default());
        let result = loop {
            match frames.next().await {
                Some(Ok(frame)) => host.handle_frame(&frame),
                Some(Err(HostError::Io(e))) => break Err(HostError::Io(e)),
                Some(Err(e)) => {
                    host.stats.rejected += 1;
                    tracing::warn!(error = %e, "unreadable frame");
                }
                None => break Ok(()),
            }
        };

        let Self { channel, pages, outbound, mut stats } = host;
        for (id, attached) in pages {
            channel.detach(id);
            let _ = attached.pump.await;
        }
        drop(outbound);
        stats.frames_out = match writer.await {
            Ok(written) => written?,
            Err(e) => {
                tracing::error!(error = %e, "frame writer panicked");
                0
            }
        };

        tracing::info!(?stats, "stdio closed");
        result.map(|()| stats)
    }

    #[tracing::instrument(skip_all, name = "host.frame", fields(len = frame.len()))]
    fn handle_frame(&mut self, frame: &[u8]) {
        self.stats.frames_in += 1;
        match HostCommand::parse(frame) {
            Ok(HostCommand::Post(envelope)) => {
                let sender = self.attach(envelope.context);
                sender.post(envelope.message);
            }
            Ok(HostCommand::Detach(id)) => {
                if self.pages.remove(&id).is_some() {
                    // Detaching closes the port, which ends its pump.
                    self.channel.detach(id);
                }
            }
            Err(e) => {
                self.stats.rejected += 1;
                tracing::warn!(error = %e, "frame rejected");
            }
        }
    }

    fn attach(&mut self, id: PageContextId) -> &PageSender {
        let channel = &self.channel;
        let outbound = &self.outbound;
        let stats = &mut self.stats;
        &self
            .pages
            .entry(id)
            .or_insert_with(|| {
                stats.contexts += 1;
                let mut port = channel.attach_page_with_id(id);
                let sender = port.sender();
                let outbound = outbound.clone();
                let pump = tokio::spawn(async move {
                    while let Some(message) = port.recv().await {
                        if outbound.send(Envelope::new(id, message)).is_err() {
                            break;
                        }
                    }
                });
                tracing::debug!(page = %id.short(), "context attached");
                Attached { sender, pump }
            })
            .sender
    }
}

async fn write_frames<W>(
    mut rx: mpsc::UnboundedReceiver<Envelope<BackgroundToClient>>,
    output: W,
) -> Result<u64, HostError>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(output, FrameCodec::default());
    let mut written = 0;
    while let Some(envelope) = rx.recv().await {
        match encode_outbound(&envelope) {
            Ok(body) => match sink.send(body).await {
                Ok(()) => written += 1,
                Err(HostError::FrameTooLarge { len, max }) => {
                    tracing::warn!(len, max, tag = %envelope.message.tag().short(), "outbound frame dropped");
                }
                Err(e) => return Err(e),
            },
            Err(e) => tracing::warn!(error = %e, "outbound frame not encodable"),
        }
    }
    sink.flush().await?;
    Ok(written)
}
