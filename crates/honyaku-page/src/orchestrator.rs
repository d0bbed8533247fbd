//! Selection-to-request orchestration.
//!
//! ```text
//!   trigger()
//!     ├─ selection empty ──────────────────────────────▶ Ignored
//!     ├─ resolve_container + decide_mode
//!     ├─ Paragraph: placeholder ─▶ open_paragraph ─▶ 1 stream (translation)
//!     └─ Word: correct() ─┬─ quota ──▶ notify(Quota) ──▶ QuotaExceeded
//!                          ├─ newer trigger or dismiss meanwhile ─▶ Superseded
//!                          └─ ok/other ─▶ wrap span ─▶ open_popup
//!                                          ─▶ 2 streams (translation, explanation)
//! ```
//!
//! Word triggers are stamped with a generation before the correction await;
//! only the latest one may open a popup.

use std::cell::Cell;
use std::rc::Rc;

use crate::client::RelayClient;
use crate::collaborators::{CorrectionError, Corrector, Notifier, PromptComposer, Severity, Speaker};
use crate::config::PageConfig;
use crate::dom::{Document, NodeId, TextSelection};
use crate::overlay::{Overlay, OverlayManager, SubStreamKind};
use crate::paragraph::{SelectionMode, decide_mode, resolve_container};

const WORD_SPAN_CLASS: &str = "honyaku-word";
const PLACEHOLDER_CLASS: &str = "honyaku-placeholder";

/// Rough expected answer sizes, used for the preliminary overlay width.
const WORD_EXPECTED_CHARS: usize = 80;
const PARAGRAPH_EXPANSION: f64 = 1.2;

/// Result of one user trigger.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// Nothing selected.
    Ignored,
    Paragraph(Rc<Overlay>),
    Word(Rc<Overlay>),
    /// Correction hit the usage limit; no overlay was created.
    QuotaExceeded,
    /// A later trigger or a dismissal arrived while correcting.
    Superseded,
}

/// External services the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub corrector: Rc<dyn Corrector>,
    pub notifier: Rc<dyn Notifier>,
    pub speaker: Rc<dyn Speaker>,
    pub prompts: Rc<dyn PromptComposer>,
}

pub struct Orchestrator {
    doc: Rc<dyn Document>,
    overlays: OverlayManager,
    client: RelayClient,
    collaborators: Collaborators,
    config: Rc<PageConfig>,
    word_generation: Cell<u64>,
}

impl Orchestrator {
    pub fn new(
        doc: Rc<dyn Document>,
        overlays: OverlayManager,
        client: RelayClient,
        collaborators: Collaborators,
        config: Rc<PageConfig>,
    ) -> Self {
        Self {
            doc,
            overlays,
            client,
            collaborators,
            config,
            word_generation: Cell::new(0),
        }
    }

    pub fn overlays(&self) -> &OverlayManager {
        &self.overlays
    }

    /// Handle one user trigger on the current selection.
    pub async fn trigger(&self) -> TriggerOutcome {
        let Some(selection) = self.doc.selection().filter(|s| !s.is_empty()) else {
            return TriggerOutcome::Ignored;
        };

        let container = resolve_container(self.doc.as_ref(), selection.anchor, &self.config.paragraph)
            .unwrap_or(selection.anchor);
        let container_text = self.doc.text_content(container);
        let mode = decide_mode(&selection.text, &container_text);
        tracing::debug!(?mode, container = %container, chars = selection.text.chars().count(), "selection resolved");

        match mode {
            SelectionMode::Paragraph => {
                TriggerOutcome::Paragraph(self.start_paragraph(&selection, container, &container_text))
            }
            SelectionMode::Word => self.start_word(selection, &container_text).await,
        }
    }

    fn start_paragraph(&self, selection: &TextSelection, container: NodeId, context: &str) -> Rc<Overlay> {
        let text = selection.text.trim();
        let placeholder = self.doc.create_element("span", PLACEHOLDER_CLASS);
        self.doc.insert_after(container, placeholder);

        let expected = (text.chars().count() as f64 * PARAGRAPH_EXPANSION) as usize;
        let overlay = self.overlays.open_paragraph(container, placeholder, expected);
        let handle = self
            .client
            .start(self.collaborators.prompts.paragraph(text, context), overlay.subscriber());
        overlay.bind(SubStreamKind::Translation, handle);
        overlay
    }

    async fn start_word(&self, selection: TextSelection, context: &str) -> TriggerOutcome {
        let generation = self.word_generation.get() + 1;
        self.word_generation.set(generation);

        let raw = selection.text.trim().to_string();
        let corrected = self.collaborators.corrector.correct(&raw, context).await;
        if self.word_generation.get() != generation {
            tracing::debug!(generation, latest = self.word_generation.get(), "word trigger superseded during correction");
            return TriggerOutcome::Superseded;
        }
        let word = match corrected {
            Ok(corrected) if !corrected.trim().is_empty() => corrected.trim().to_string(),
            Ok(_) => raw,
            Err(CorrectionError::Quota { message, code }) => {
                tracing::warn!(code = ?code, %message, "correction hit usage limit");
                self.collaborators.notifier.notify(&message, Severity::Quota);
                return TriggerOutcome::QuotaExceeded;
            }
            Err(e) => {
                tracing::debug!(error = %e, "correction failed, using raw selection");
                raw
            }
        };

        let target = TextSelection { text: word.clone(), ..selection };
        let span = self
            .doc
            .wrap_selection(&target, "span", WORD_SPAN_CLASS)
            .unwrap_or(target.anchor);

        let overlay = self.overlays.open_popup(
            span,
            &[SubStreamKind::Translation, SubStreamKind::Explanation],
            WORD_EXPECTED_CHARS,
        );
        let prompts = &self.collaborators.prompts;
        let translation = self.client.start(prompts.translation(&word, context), overlay.subscriber());
        overlay.bind(SubStreamKind::Translation, translation);
        let explanation = self.client.start(prompts.explanation(&word, context), overlay.subscriber());
        overlay.bind(SubStreamKind::Explanation, explanation);
        TriggerOutcome::Word(overlay)
    }

    /// Click or hover on a previously wrapped word.
    pub fn reopen(&self, span: NodeId) -> Option<Rc<Overlay>> {
        self.overlays.reopen(span)
    }

    /// Read a sub-stream's rendered text aloud. Does not touch streaming state.
    pub fn speak(&self, overlay: &Overlay, kind: SubStreamKind) {
        let Some(slot) = overlay.slot(kind) else { return };
        let text = self.doc.text_content(slot);
        if !text.trim().is_empty() {
            self.collaborators.speaker.speak(text.trim());
        }
    }

    /// Close the popup and drop any word trigger still correcting.
    pub fn dismiss(&self) -> bool {
        self.word_generation.set(self.word_generation.get() + 1);
        self.overlays.dismiss()
    }
}
