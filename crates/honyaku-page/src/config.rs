//! Page agent tunables.

use serde::Deserialize;

use crate::overlay::layout::WidthPolicy;
use crate::paragraph::ParagraphRules;

/// Server error codes that mean "usage limit reached".
pub const DEFAULT_QUOTA_ERROR_CODES: &[i64] = &[3001];

#[derive(Debug, thiserror::Error)]
pub enum PageConfigError {
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// Model requested from the relay; empty means the relay default.
    pub model: String,
    /// Gap between a popup and its anchor, in pixels.
    pub popup_gap: f64,
    pub width: WidthPolicy,
    pub paragraph: ParagraphRules,
    pub quota_error_codes: Vec<i64>,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            popup_gap: 6.0,
            width: WidthPolicy::default(),
            paragraph: ParagraphRules::default(),
            quota_error_codes: DEFAULT_QUOTA_ERROR_CODES.to_vec(),
        }
    }
}

impl PageConfig {
    pub fn from_ron(text: &str) -> Result<Self, PageConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn is_quota_code(&self, code: Option<i64>) -> bool {
        code.is_some_and(|c| self.quota_error_codes.contains(&c))
    }
}
