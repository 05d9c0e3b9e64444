//! Prompt construction for the chat-completions API.

use serde::{Deserialize, Serialize};

use crate::language::Language;

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Messages asking whether `current` still renders `incoming` faithfully.
pub fn closeness_messages(incoming: &str, current: &str, language: Language) -> Vec<ChatMessage> {
    let system = format!(
        "You review {lang} translations of software documentation. \
         You are given the new English source and an existing {lang} translation of an \
         older version of it. Decide whether the existing translation is still an \
         acceptable rendering of the new English text: same meaning, same facts, same \
         code, same links and Markdown structure. Wording differences are fine; missing, \
         extra or changed content is not, and neither is text left in English that a \
         translator would have translated. \
         Answer with a JSON object only: {{\"close_enough\": true|false, \"reason\": \"<one sentence>\"}}.",
        lang = language.name()
    );
    let user = format!(
        "English source:\n<<<ENGLISH\n{}\nENGLISH>>>\n\nExisting {} translation:\n<<<TRANSLATION\n{}\nTRANSLATION>>>",
        incoming,
        language.name(),
        current
    );
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

/// Messages asking for a translation of `text`.
pub fn translation_messages(text: &str, language: Language) -> Vec<ChatMessage> {
    let system = format!(
        "You translate software documentation from English to {lang}. Rules:\n\
         - Translate prose, headings, list items, code comments and user-visible string literals.\n\
         - Never change code: keywords, identifiers, function and variable names, imports, \
           JSX/HTML tag and attribute names, and object keys stay exactly as they are.\n\
         - Keep Markdown and MDX structure, link targets, anchors like {{/*id*/}}, \
           inline code and blank lines unchanged.\n\
         - Keep line breaks where the source has them.\n\
         - Output only the translated text, with no explanations and no surrounding code fence.",
        lang = language.name()
    );
    vec![ChatMessage::system(system), ChatMessage::user(text.to_string())]
}
