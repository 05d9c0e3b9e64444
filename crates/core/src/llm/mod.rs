//! LLM-backed closeness judgments and translations.
//!
//! [`TranslationService`] is the seam between the conflict processor and the
//! API; [`OpenAiClient`] is the production implementation.

pub mod openai;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::LlmError;
use crate::language::Language;

pub use openai::OpenAiClient;

/// The API's opinion on an existing translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosenessVerdict {
    /// `true` when the current translation can be kept.
    pub close_enough: bool,
    /// Short justification, when the model gave one.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Closeness checks and translations for one conflict at a time.
#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Judge whether `current` is an acceptable `language` rendering of the
    /// English `incoming` text.
    async fn check_closeness(
        &self,
        incoming: &str,
        current: &str,
        language: Language,
    ) -> Result<ClosenessVerdict, LlmError>;

    /// Translate English `text` into `language`, leaving code intact.
    async fn translate(&self, text: &str, language: Language) -> Result<String, LlmError>;
}
