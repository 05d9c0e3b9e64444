//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::prompts::{closeness_messages, translation_messages, ChatMessage};
use super::{ClosenessVerdict, TranslationService};
use crate::config::LlmConfig;
use crate::errors::LlmError;
use crate::language::Language;

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Asynchronous chat-completions client.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let endpoint = format!("{}/chat/completions", config.api_url.trim_end_matches('/'));
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("lingomerge/0.1"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        info!(endpoint = %endpoint, model = %config.model, "created OpenAiClient");
        Ok(Self {
            http,
            endpoint,
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Send one chat request and return the first choice's content.
    async fn chat(&self, messages: &[ChatMessage], json_mode: bool) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, "LLM API returned error");
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        extract_content(parsed)
    }
}

#[async_trait]
impl TranslationService for OpenAiClient {
    #[instrument(skip_all, fields(language = language.code()))]
    async fn check_closeness(
        &self,
        incoming: &str,
        current: &str,
        language: Language,
    ) -> Result<ClosenessVerdict, LlmError> {
        let messages = closeness_messages(incoming, current, language);
        let raw = self.chat(&messages, true).await?;
        let verdict = parse_verdict(&raw)?;
        debug!(close_enough = verdict.close_enough, "closeness verdict");
        Ok(verdict)
    }

    #[instrument(skip_all, fields(language = language.code(), len = text.len()))]
    async fn translate(&self, text: &str, language: Language) -> Result<String, LlmError> {
        let messages = translation_messages(text, language);
        let raw = self.chat(&messages, false).await?;
        let cleaned = clean_translation(&raw, text);
        if cleaned.trim().is_empty() {
            return Err(LlmError::InvalidResponse("empty translation".into()));
        }
        debug!(len = cleaned.len(), "translation received");
        Ok(cleaned)
    }
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

/// The content of the first choice.
pub fn extract_content(response: ChatResponse) -> Result<String, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("no choices in response".into()))?;
    if choice.finish_reason.as_deref() == Some("length") {
        return Err(LlmError::InvalidResponse(
            "response truncated at max_tokens".into(),
        ));
    }
    choice
        .message
        .content
        .ok_or_else(|| LlmError::InvalidResponse("choice has no content".into()))
}

/// Remove one code fence wrapping the whole text, e.g. "```json\n...\n```".
fn strip_wrapping_fence(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let inner = trimmed.strip_prefix("```")?.strip_suffix("```")?;
    // Drop the info string on the opening line.
    let body_start = inner.find('\n').map(|i| i + 1).unwrap_or(0);
    Some(inner[body_start..].trim_end_matches(['\n', '\r']))
}

/// Interpret a closeness answer: a JSON object, optionally fenced, or a
/// bare YES/NO.
pub fn parse_verdict(raw: &str) -> Result<ClosenessVerdict, LlmError> {
    let text = strip_wrapping_fence(raw).unwrap_or(raw).trim();

    if let Ok(verdict) = serde_json::from_str::<ClosenessVerdict>(text) {
        return Ok(verdict);
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(verdict) = serde_json::from_str::<ClosenessVerdict>(&text[start..=end]) {
                return Ok(verdict);
            }
        }
    }

    let upper = text.to_uppercase();
    let reason = text
        .split_once(|c: char| c == '.' || c == ':' || c == '-' || c == '\n')
        .map(|(_, rest)| rest.trim().to_string())
        .filter(|r| !r.is_empty());
    if starts_with_word(&upper, "YES") {
        return Ok(ClosenessVerdict {
            close_enough: true,
            reason,
        });
    }
    if starts_with_word(&upper, "NO") {
        return Ok(ClosenessVerdict {
            close_enough: false,
            reason,
        });
    }

    Err(LlmError::VerdictParse(truncate(text, 120)))
}

/// `text` opens with `word` as a whole word (`NO.` but not `NOTE`).
fn starts_with_word(text: &str, word: &str) -> bool {
    text.strip_prefix(word)
        .is_some_and(|rest| !rest.starts_with(char::is_alphanumeric))
}

/// Normalise a translation: drop a code fence the model wrapped around the
/// whole answer unless the source itself was fenced that way.
pub fn clean_translation(raw: &str, source: &str) -> String {
    let source_fenced = source.trim_start().starts_with("```");
    match strip_wrapping_fence(raw) {
        Some(inner) if !source_fenced => inner.to_string(),
        _ => raw.trim_end_matches(['\n', '\r']).to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
