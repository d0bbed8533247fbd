//! Page agent: wires one page context together.
//!
//! ```text
//!   PagePort ──(spawn_local)──▶ Correlator::dispatch ──▶ Overlay sub-streams
//!      ▲                                                      ▲
//!      └── PageSender ◀── RelayClient ◀── Orchestrator ───────┘
//! ```
//!
//! Everything here is `!Send` and must run on a `tokio::task::LocalSet`.

use std::rc::Rc;

use honyaku_channel::PagePort;
use honyaku_types::StreamEvent;
use tokio::task::JoinHandle;

use crate::client::RelayClient;
use crate::config::PageConfig;
use crate::correlator::Correlator;
use crate::dom::Document;
use crate::orchestrator::{Collaborators, Orchestrator};
use crate::overlay::OverlayManager;

pub struct PageAgent {
    port: PagePort,
    correlator: Rc<Correlator>,
    orchestrator: Rc<Orchestrator>,
}

impl PageAgent {
    pub fn new(
        port: PagePort,
        doc: Rc<dyn Document>,
        collaborators: Collaborators,
        config: PageConfig,
    ) -> Self {
        let config = Rc::new(config);
        let correlator = Correlator::new();
        let client = RelayClient::new(port.sender(), Rc::clone(&correlator), config.model.clone());
        let overlays = OverlayManager::new(
            Rc::clone(&doc),
            Rc::clone(&config),
            Rc::clone(&collaborators.notifier),
        );
        let orchestrator = Rc::new(Orchestrator::new(doc, overlays, client, collaborators, config));
        Self {
            port,
            correlator,
            orchestrator,
        }
    }

    pub fn correlator(&self) -> &Rc<Correlator> {
        &self.correlator
    }

    pub fn orchestrator(&self) -> &Rc<Orchestrator> {
        &self.orchestrator
    }

    /// Dispatch inbound messages until the page is detached. Returns the
    /// orchestrator for the caller to drive user triggers.
    pub fn spawn(self) -> (Rc<Orchestrator>, JoinHandle<()>) {
        let Self {
            port,
            correlator,
            orchestrator,
        } = self;
        let page = port.id();
        let overlays = orchestrator.overlays().clone();
        let task = tokio::task::spawn_local(async move {
            tracing::debug!(page = %page.short(), "page agent listening");
            port.on_message(|message| correlator.dispatch(StreamEvent::from(message)))
                .await;
            // Background gone: nothing will finish the remaining overlays.
            overlays.clear();
        });
        (orchestrator, task)
    }
}
