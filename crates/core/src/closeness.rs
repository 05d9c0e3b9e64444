//! Local closeness checks run before any API call.
//!
//! Most conflicts can be settled without asking the model: an empty
//! translation, an incoming side with nothing to translate, or a code sample
//! whose structure changed upstream. Only conflicts that survive these
//! checks cost a closeness request.

use serde::Serialize;
use tracing::debug;

use crate::language::LanguageDetector;

/// Outcome of the local checks for one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Precheck {
    /// Take the incoming text as-is.
    AcceptIncoming,
    /// Translate the incoming text.
    Translate(TranslateReason),
    /// The existing translation is plausible; ask the API.
    AskApi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslateReason {
    CurrentEmpty,
    CurrentIsIncoming,
    CodeChanged,
    CurrentNotTranslated,
    NotCloseEnough,
}

impl TranslateReason {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::CurrentEmpty => "no existing translation",
            Self::CurrentIsIncoming => "existing side is the untranslated text",
            Self::CodeChanged => "code structure changed",
            Self::CurrentNotTranslated => "existing side is not in the target language",
            Self::NotCloseEnough => "existing translation drifted from the source",
        }
    }
}

impl std::fmt::Display for TranslateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// Whether the code structure of the two sides differs.
pub fn skeleton_changed(incoming: &str, current: &str) -> bool {
    let a = LanguageDetector::skeleton(incoming);
    let b = LanguageDetector::skeleton(current);
    let patch = diffy::create_patch(&a, &b);
    !patch.hunks().is_empty()
}

/// Classify a conflict locally.
pub fn precheck(detector: &LanguageDetector, incoming: &str, current: &str) -> Precheck {
    let verdict = if current.trim().is_empty() {
        Precheck::Translate(TranslateReason::CurrentEmpty)
    } else if !LanguageDetector::needs_translation(incoming) {
        Precheck::AcceptIncoming
    } else if incoming.trim() == current.trim() {
        Precheck::Translate(TranslateReason::CurrentIsIncoming)
    } else if skeleton_changed(incoming, current) {
        Precheck::Translate(TranslateReason::CodeChanged)
    } else if !detector.appears_translated(current) {
        Precheck::Translate(TranslateReason::CurrentNotTranslated)
    } else {
        Precheck::AskApi
    };
    debug!(?verdict, "precheck");
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    fn fr() -> LanguageDetector {
        LanguageDetector::new(Language::French)
    }

    #[test]
    fn test_empty_current_translates() {
        assert_eq!(
            precheck(&fr(), "Server Components", "  \n"),
            Precheck::Translate(TranslateReason::CurrentEmpty)
        );
    }

    #[test]
    fn test_nothing_to_translate_accepts_incoming() {
        assert_eq!(
            precheck(&fr(), "const x = 5;", "const x = 4;"),
            Precheck::AcceptIncoming
        );
    }

    #[test]
    fn test_identical_sides_translate() {
        assert_eq!(
            precheck(&fr(), "Server Components", "Server Components"),
            Precheck::Translate(TranslateReason::CurrentIsIncoming)
        );
    }

    #[test]
    fn test_code_change_translates() {
        let incoming = "const title = \"Hello world\";\nconsole.log(title, 2);";
        let current = "const title = \"Bonjour le monde\";\nconsole.log(title);";
        assert_eq!(
            precheck(&fr(), incoming, current),
            Precheck::Translate(TranslateReason::CodeChanged)
        );
    }

    #[test]
    fn test_literal_change_only_asks_api() {
        let incoming = "const title = \"Hello world\";";
        let current = "const title = \"Bonjour le monde\";";
        assert!(!skeleton_changed(incoming, current));
        assert_eq!(precheck(&fr(), incoming, current), Precheck::AskApi);
    }

    #[test]
    fn test_english_current_translates() {
        assert_eq!(
            precheck(&fr(), "Server Components are new", "The Server Components"),
            Precheck::Translate(TranslateReason::CurrentNotTranslated)
        );
    }

    #[test]
    fn test_translated_prose_asks_api() {
        assert_eq!(
            precheck(&fr(), "The reference guide", "Le guide de référence"),
            Precheck::AskApi
        );
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(
            TranslateReason::CodeChanged.to_string(),
            "code structure changed"
        );
    }
}
