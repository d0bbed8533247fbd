//! Interfaces to the services the page agent consumes but does not own.

use async_trait::async_trait;
use honyaku_types::PromptPayload;

/// Error from the non-streaming correction call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrectionError {
    /// Hard usage limit. Aborts the request and gets a dedicated notification.
    #[error("quota exceeded: {message}")]
    Quota { message: String, code: Option<i64> },

    /// Anything else; the raw selection is used instead.
    #[error("correction failed: {0}")]
    Failed(String),
}

/// Expands a raw selection to the smallest complete lexical unit.
#[async_trait(?Send)]
pub trait Corrector {
    async fn correct(&self, selection: &str, context: &str) -> Result<String, CorrectionError>;
}

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
    /// Usage limit reached; shown with an actionable prompt.
    Quota,
}

/// Fire-and-forget user notification (toast).
pub trait Notifier {
    fn notify(&self, message: &str, severity: Severity);
}

/// Audio playback of rendered text.
pub trait Speaker {
    fn speak(&self, text: &str);
}

/// Builds the prompts for each request kind.
pub trait PromptComposer {
    fn translation(&self, text: &str, context: &str) -> PromptPayload;
    fn explanation(&self, text: &str, context: &str) -> PromptPayload;
    fn paragraph(&self, text: &str, context: &str) -> PromptPayload;
}

/// Plain instruction templates.
#[derive(Debug, Clone)]
pub struct TemplatePrompts {
    pub target_language: String,
}

impl Default for TemplatePrompts {
    fn default() -> Self {
        Self { target_language: "English".into() }
    }
}

impl PromptComposer for TemplatePrompts {
    fn translation(&self, text: &str, context: &str) -> PromptPayload {
        PromptPayload::new(format!("Word: {text}\nSentence: {context}")).with_system(format!(
            "Give a short {} translation of the word as used in the sentence. Reply with the translation only.",
            self.target_language
        ))
    }

    fn explanation(&self, text: &str, context: &str) -> PromptPayload {
        PromptPayload::new(format!("Word: {text}\nSentence: {context}")).with_system(format!(
            "Explain in {} what the word means in this sentence, with its grammatical role.",
            self.target_language
        ))
    }

    fn paragraph(&self, text: &str, _context: &str) -> PromptPayload {
        PromptPayload::new(text).with_system(format!(
            "Translate the text into {}. Reply with the translation only.",
            self.target_language
        ))
    }
}
