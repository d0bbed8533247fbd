//! Scripted upstream for relay tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use honyaku_relay::{PromptTransport, TransportError, TransportResponse};
use honyaku_types::PromptPayload;
use parking_lot::Mutex;

/// How the body ends after the scripted chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    /// Clean end of stream.
    Eof,
    /// Never yields again.
    Hang,
    /// Body read error.
    Fail,
}

/// One scripted response per submit, replayed in order.
pub struct ScriptedTransport {
    responses: Mutex<Vec<Script>>,
    pub submits: AtomicUsize,
    pub last_model: Mutex<Option<String>>,
    /// Response bodies dropped so far, i.e. upstream reads abandoned or done.
    pub bodies_dropped: Arc<AtomicUsize>,
}

/// Counts a body stream going away.
struct BodyGuard(Arc<AtomicUsize>);

impl Drop for BodyGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct Script {
    pub status: u16,
    pub chunks: Vec<&'static str>,
    pub tail: Tail,
}

impl Script {
    pub fn ok(chunks: Vec<&'static str>) -> Self {
        Self { status: 200, chunks, tail: Tail::Eof }
    }

    pub fn status(status: u16, body: &'static str) -> Self {
        Self { status, chunks: vec![body], tail: Tail::Eof }
    }

    pub fn then(mut self, tail: Tail) -> Self {
        self.tail = tail;
        self
    }
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(scripts),
            submits: AtomicUsize::new(0),
            last_model: Mutex::new(None),
            bodies_dropped: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn bodies_dropped(&self) -> usize {
        self.bodies_dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PromptTransport for ScriptedTransport {
    async fn submit(&self, _payload: &PromptPayload, model: &str) -> Result<TransportResponse, TransportError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        *self.last_model.lock() = Some(model.to_string());
        let script = {
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                return Err(TransportError::Request("no scripted response".into()));
            }
            responses.remove(0)
        };

        let head = futures::stream::iter(
            script
                .chunks
                .into_iter()
                .map(|c| Ok::<_, TransportError>(Bytes::from_static(c.as_bytes()))),
        );
        let body = match script.tail {
            Tail::Eof => head.boxed(),
            Tail::Hang => head.chain(futures::stream::pending()).boxed(),
            Tail::Fail => head
                .chain(futures::stream::once(async {
                    Err(TransportError::Body("connection reset".into()))
                }))
                .boxed(),
        };
        let guard = BodyGuard(Arc::clone(&self.bodies_dropped));
        let body = body
            .map(move |item| {
                let _held = &guard;
                item
            })
            .boxed();
        Ok(TransportResponse::new(script.status, body))
    }
}
