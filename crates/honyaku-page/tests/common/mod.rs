//! Page harness: a MemoryDocument page, a running PageAgent and a fake
//! background that the test drives by hand.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use futures::FutureExt;
use honyaku_channel::{BackgroundInbox, Destination, MessageChannel};
use honyaku_page::{
    Collaborators, CorrectionError, Corrector, Document, MemoryDocument, NodeId, Notifier,
    Orchestrator, PageAgent, PageConfig, Rect, Severity, Speaker, TemplatePrompts, TriggerOutcome,
};
use honyaku_types::{
    BackgroundToClient, ClientToBackground, PageContextId, RequestTag, StreamEvent,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct Toasts(pub RefCell<Vec<(String, Severity)>>);

impl Notifier for Toasts {
    fn notify(&self, message: &str, severity: Severity) {
        self.0.borrow_mut().push((message.to_string(), severity));
    }
}

impl Toasts {
    pub fn severities(&self) -> Vec<Severity> {
        self.0.borrow().iter().map(|(_, s)| *s).collect()
    }
}

#[derive(Default)]
pub struct SpeakerLog(pub RefCell<Vec<String>>);

impl Speaker for SpeakerLog {
    fn speak(&self, text: &str) {
        self.0.borrow_mut().push(text.to_string());
    }
}

/// Replays queued results; echoes the selection when the queue is empty.
/// A parked `gate` holds the next call until it is released.
#[derive(Default)]
pub struct ScriptedCorrector {
    pub results: RefCell<VecDeque<Result<String, CorrectionError>>>,
    pub calls: RefCell<Vec<String>>,
    pub gate: RefCell<Option<oneshot::Receiver<()>>>,
}

impl ScriptedCorrector {
    /// Hold the next correction until the returned sender fires.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *self.gate.borrow_mut() = Some(gate);
        release
    }
}

#[async_trait(?Send)]
impl Corrector for ScriptedCorrector {
    async fn correct(&self, selection: &str, _context: &str) -> Result<String, CorrectionError> {
        self.calls.borrow_mut().push(selection.to_string());
        let gate = self.gate.borrow_mut().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.results
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(selection.to_string()))
    }
}

pub const SENTENCE: &str = "El gato negro duerme en la silla de la cocina";

pub struct Harness {
    pub doc: Rc<MemoryDocument>,
    pub orchestrator: Rc<Orchestrator>,
    pub channel: MessageChannel,
    pub inbox: BackgroundInbox,
    pub page: PageContextId,
    pub toasts: Rc<Toasts>,
    pub speaker: Rc<SpeakerLog>,
    pub corrector: Rc<ScriptedCorrector>,
    /// Paragraph element holding [`SENTENCE`].
    pub paragraph: NodeId,
    /// Text node inside `paragraph`.
    pub text: NodeId,
    pub agent_task: JoinHandle<()>,
}

impl Harness {
    /// Must be called inside a `LocalSet`.
    pub fn new() -> Self {
        Self::with_config(PageConfig::default())
    }

    pub fn with_config(config: PageConfig) -> Self {
        let doc = Rc::new(MemoryDocument::default());
        let article = doc.element(doc.body(), "article");
        let paragraph = doc.element(article, "p");
        let text = doc.text(paragraph, SENTENCE);
        doc.set_rect(paragraph, Rect::new(40.0, 200.0, 600.0, 40.0));

        let (channel, inbox) = MessageChannel::new();
        let port = channel.attach_page();
        let page = port.id();

        let toasts = Rc::new(Toasts::default());
        let speaker = Rc::new(SpeakerLog::default());
        let corrector = Rc::new(ScriptedCorrector::default());
        let collaborators = Collaborators {
            corrector: corrector.clone(),
            notifier: toasts.clone(),
            speaker: speaker.clone(),
            prompts: Rc::new(TemplatePrompts::default()),
        };
        let agent = PageAgent::new(port, doc.clone(), collaborators, config);
        let (orchestrator, agent_task) = agent.spawn();

        Self {
            doc,
            orchestrator,
            channel,
            inbox,
            page,
            toasts,
            speaker,
            corrector,
            paragraph,
            text,
            agent_task,
        }
    }

    /// Select `word` inside the sentence. Earlier word spans split the
    /// original text node, so look for the piece that still holds it.
    pub fn select(&self, word: &str) {
        let anchor = self
            .doc
            .children(self.paragraph)
            .into_iter()
            .find(|n| self.doc.tag_name(*n).is_none() && self.doc.text_content(*n).contains(word))
            .unwrap_or(self.text);
        let at = SENTENCE.find(word).unwrap_or(0) as f64;
        self.doc.select(anchor, word, Rect::new(40.0 + at * 8.0, 200.0, word.len() as f64 * 8.0, 18.0));
    }

    /// Select the whole sentence, which resolves to paragraph mode.
    pub fn select_paragraph(&self) {
        self.doc.select(self.text, SENTENCE, Rect::new(40.0, 200.0, 600.0, 18.0));
    }

    pub async fn trigger(&self, word: &str) -> TriggerOutcome {
        self.select(word);
        self.orchestrator.trigger().await
    }

    /// Everything the page posted since the last call.
    pub fn posted(&mut self) -> Vec<ClientToBackground> {
        let mut out = Vec::new();
        while let Some(Some(envelope)) = self.inbox.recv().now_or_never() {
            assert_eq!(envelope.context, self.page);
            out.push(envelope.message);
        }
        out
    }

    /// Tags of the START_STREAM messages posted since the last call.
    pub fn started(&mut self) -> Vec<RequestTag> {
        self.posted()
            .into_iter()
            .filter_map(|m| match m {
                ClientToBackground::StartStream { tag, .. } => Some(tag),
                _ => None,
            })
            .collect()
    }

    /// Deliver events as the relay would, then let the agent run.
    pub async fn emit(&self, events: impl IntoIterator<Item = StreamEvent>) {
        for event in events {
            self.channel
                .send(Destination::Page(self.page), BackgroundToClient::from(event));
        }
        settle().await;
    }

    pub fn text_of(&self, node: Option<NodeId>) -> String {
        node.map(|n| self.doc.text_content(n)).unwrap_or_default()
    }
}

/// Give spawned local tasks a chance to drain their queues.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
