//! Heuristic checks on conflict text.
//!
//! Documentation conflicts mix Markdown prose, fenced code samples, JSX and
//! JSON. The detector splits a text into the parts a translator is expected
//! to touch (prose, user-visible string literals, comments) and the parts it
//! must leave alone (code), then scores the translatable parts.
//!
//! | Part | needs_translation | appears_translated | skeleton |
//! |------|-------------------|--------------------|----------|
//! | Prose lines | yes | yes | dropped |
//! | String literals | yes | yes | blanked |
//! | Comments | yes | no | dropped |
//! | Code | no | no | kept |

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::Serialize;
use tracing::debug;

use super::{Language, Script, ENGLISH_KEYWORDS};

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

fn literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|`(?:[^`\\]|\\.)*`"#)
            .expect("literal pattern is valid")
    })
}

fn jsx_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r">([^<>{}]*[A-Za-z][^<>{}]*)<").expect("jsx pattern is valid"))
}

fn json_key_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^"[^"]*"\s*:"#).expect("json pattern is valid"))
}

/// Prose noise: inline code, link targets, tags, MDX comments, bare URLs.
fn prose_noise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"`[^`]*`|\]\([^)]*\)|</?[A-Za-z][^>]*>|\{/\*.*?\*/\}|https?://\S+")
            .expect("prose noise pattern is valid")
    })
}

const CODE_PREFIXES: &[&str] = &[
    "const ", "let ", "var ", "function ", "function(", "import ", "export ", "return",
    "//", "/*", "if (", "} else", "for (", "while (", "class ", "async ", "await ",
    "switch (", "case ", "default:", "=>", "}", "{", "]", ");",
];

const CODE_SUFFIXES: &[&str] = &[";", "{", "}", "},", "];", ");", "=>", "(", "["];

const CODE_FRAGMENTS: &[&str] = &[" => ", " = ", "();", "===", "!=="];

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Fence,
    Code,
    Prose,
}

fn is_fence(trimmed: &str) -> bool {
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Tags and blank lines carry no signal for the prose/code vote.
fn is_neutral(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed.starts_with('<')
}

fn is_code_line(trimmed: &str) -> bool {
    CODE_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        || CODE_SUFFIXES.iter().any(|s| trimmed.ends_with(s))
        || CODE_FRAGMENTS.iter().any(|f| trimmed.contains(f))
        || json_key_line_re().is_match(trimmed)
}

fn classify_lines(text: &str) -> Vec<(LineKind, &str)> {
    let mut in_fence = false;
    let mut kinds = Vec::new();
    let mut code_votes = 0usize;
    let mut prose_votes = 0usize;

    for line in text.lines() {
        let trimmed = line.trim();
        if is_fence(trimmed) {
            in_fence = !in_fence;
            kinds.push((LineKind::Fence, line));
        } else if in_fence {
            kinds.push((LineKind::Code, line));
        } else {
            if !is_neutral(trimmed) {
                if is_code_line(trimmed) {
                    code_votes += 1;
                } else {
                    prose_votes += 1;
                }
            }
            // Placeholder; resolved once the vote is in.
            kinds.push((LineKind::Prose, line));
        }
    }

    let code_mode = code_votes > 0 && code_votes >= prose_votes;
    if code_mode {
        // Re-walk fences so only unfenced lines flip to code.
        let mut in_fence = false;
        for (kind, line) in kinds.iter_mut() {
            if is_fence(line.trim()) {
                in_fence = !in_fence;
            } else if !in_fence {
                *kind = LineKind::Code;
            }
        }
    }
    kinds
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// The translatable parts of a text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub prose: Vec<String>,
    pub literals: Vec<String>,
    pub comments: Vec<String>,
}

/// A literal that reads like an identifier, path or module name rather than
/// something a reader sees.
fn is_identifier_like(body: &str) -> bool {
    if body.chars().any(char::is_whitespace) {
        return false;
    }
    body.is_empty()
        || body.contains(|c: char| "/._-@:#=".contains(c))
        || body
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Whether the literal ending at `end` is immediately followed by a colon
/// (an object or JSON key).
fn is_key(line: &str, end: usize) -> bool {
    line[end..].trim_start().starts_with(':')
}

struct CodeLine {
    literals: Vec<String>,
    comment: Option<String>,
    skeleton: String,
}

/// `line` with every literal's bytes replaced by spaces, so comment markers
/// can be located without tripping over `//` inside URLs.
fn mask_literals(line: &str) -> String {
    let mut masked = String::with_capacity(line.len());
    let mut last = 0;
    for m in literal_re().find_iter(line) {
        masked.push_str(&line[last..m.start()]);
        masked.extend(std::iter::repeat(" ").take(m.as_str().len()));
        last = m.end();
    }
    masked.push_str(&line[last..]);
    masked
}

/// Split a code line into its code part and its comment text.
fn split_comment(line: &str) -> (String, Option<String>) {
    let masked = mask_literals(line);
    if let Some(idx) = masked.find("//") {
        let comment = line[idx + 2..].trim().to_string();
        return (line[..idx].to_string(), Some(comment));
    }
    if let Some(idx) = masked.find("/*") {
        let tail = &masked[idx + 2..];
        let body_end = idx + 2 + tail.find("*/").unwrap_or(tail.len());
        let comment = line[idx + 2..body_end].trim().to_string();
        let after = line.get(body_end + 2..).unwrap_or_default();
        return (format!("{}{}", &line[..idx], after), Some(comment));
    }
    (line.to_string(), None)
}

fn split_code_line(line: &str) -> CodeLine {
    let (code, comment) = split_comment(line.trim());

    let mut literals = Vec::new();
    let mut skeleton = String::with_capacity(code.len());
    let mut last = 0;
    for m in literal_re().find_iter(&code) {
        skeleton.push_str(&code[last..m.start()]);
        let raw = m.as_str();
        let body = &raw[1..raw.len() - 1];
        if is_identifier_like(body) || is_key(&code, m.end()) {
            skeleton.push_str(raw);
        } else {
            literals.push(body.to_string());
            skeleton.push_str(&raw[..1]);
            skeleton.push_str(&raw[raw.len() - 1..]);
        }
        last = m.end();
    }
    skeleton.push_str(&code[last..]);

    let snapshot = skeleton.clone();
    for cap in jsx_text_re().captures_iter(&snapshot) {
        if let Some(text) = cap.get(1) {
            literals.push(text.as_str().trim().to_string());
            skeleton = skeleton.replacen(text.as_str(), "", 1);
        }
    }

    CodeLine {
        literals,
        comment: comment.filter(|c| !c.is_empty()),
        skeleton: skeleton.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

fn clean_prose(line: &str) -> String {
    prose_noise_re()
        .replace_all(line, |caps: &regex_lite::Captures<'_>| {
            if caps[0].starts_with("](") {
                "]".to_string()
            } else {
                " ".to_string()
            }
        })
        .trim()
        .to_string()
}

/// Lower-cased words of a text; apostrophes inside words are kept so that
/// elisions (`l'histoire`) and possessives (`ankit's`) survive.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphabetic() || c == '\'' || c == '’'))
        .map(|w| {
            w.trim_matches(|c| c == '\'' || c == '’')
                .replace('’', "'")
                .to_lowercase()
        })
        .filter(|w| w.chars().any(char::is_alphabetic))
        .collect()
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Indicator counts for one text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LanguageScore {
    /// Words judged (prose and string literals only).
    pub words: usize,
    /// Words carrying a target-language indicator.
    pub target: usize,
    /// Words carrying an English indicator.
    pub english: usize,
}

/// Language heuristics bound to one target language.
#[derive(Debug, Clone, Copy)]
pub struct LanguageDetector {
    language: Language,
}

impl LanguageDetector {
    pub fn new(language: Language) -> Self {
        Self { language }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Whether the unfenced lines of `text` read as code rather than prose.
    pub fn looks_like_code(text: &str) -> bool {
        let kinds = classify_lines(text);
        let mut in_fence = false;
        kinds.iter().any(|(kind, _)| {
            if *kind == LineKind::Fence {
                in_fence = !in_fence;
                return false;
            }
            !in_fence && *kind == LineKind::Code
        })
    }

    /// Split `text` into prose, user-visible literals and comments.
    pub fn extract(text: &str) -> Extracted {
        let mut out = Extracted::default();
        for (kind, line) in classify_lines(text) {
            match kind {
                LineKind::Fence => {}
                LineKind::Code => {
                    let code = split_code_line(line);
                    out.literals.extend(code.literals);
                    out.comments.extend(code.comment);
                }
                LineKind::Prose => {
                    let prose = clean_prose(line);
                    if !prose.is_empty() {
                        out.prose.push(prose);
                    }
                }
            }
        }
        out
    }

    /// The translatable text of `text`, one part per line: prose for
    /// documents, string literals and comments for code.
    pub fn translatable_text(text: &str) -> String {
        let ex = Self::extract(text);
        ex.prose
            .into_iter()
            .chain(ex.literals)
            .chain(ex.comments)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The code structure of `text`: code lines with translatable literals
    /// blanked and comments removed, prose dropped, whitespace collapsed.
    pub fn skeleton(text: &str) -> String {
        let mut lines = Vec::new();
        for (kind, line) in classify_lines(text) {
            match kind {
                LineKind::Fence => lines.push(line.trim().to_string()),
                LineKind::Code => {
                    let code = split_code_line(line);
                    if !code.skeleton.is_empty() {
                        lines.push(code.skeleton);
                    }
                }
                LineKind::Prose => {}
            }
        }
        let mut out = lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    /// Whether `text` contains anything a translator would change.
    pub fn needs_translation(text: &str) -> bool {
        let ex = Self::extract(text);
        ex.prose
            .iter()
            .chain(ex.literals.iter())
            .chain(ex.comments.iter())
            .flat_map(|part| words(part))
            .any(|w| w.chars().filter(|c| c.is_alphabetic()).count() >= 2)
    }

    /// Score the prose and literals of `text` against the target language.
    pub fn score(&self, text: &str) -> LanguageScore {
        let ex = Self::extract(text);
        let judged: Vec<String> = ex
            .prose
            .iter()
            .chain(ex.literals.iter())
            .flat_map(|part| words(part))
            .collect();

        let mut score = LanguageScore {
            words: judged.len(),
            ..LanguageScore::default()
        };

        match self.language.script() {
            Script::Latin {
                accents,
                keywords,
                elisions,
            } => {
                for w in &judged {
                    let elided = elisions
                        .iter()
                        .find(|e| w.starts_with(*e) && w.len() > e.len())
                        .map(|e| &w[e.len()..]);
                    let stem = elided.unwrap_or(w.as_str());
                    if elided.is_some()
                        || w.chars().any(|c| accents.contains(c))
                        || keywords.contains(&stem)
                    {
                        score.target += 1;
                    } else if (ENGLISH_KEYWORDS.contains(&w.as_str())
                        && !keywords.contains(&w.as_str()))
                        || w.ends_with("'s")
                    {
                        score.english += 1;
                    }
                }
            }
            Script::Ranges(ranges) => {
                for w in &judged {
                    if w.chars()
                        .any(|c| ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&c)))
                    {
                        score.target += 1;
                    } else if ENGLISH_KEYWORDS.contains(&w.as_str()) || w.ends_with("'s") {
                        score.english += 1;
                    }
                }
            }
        }
        score
    }

    /// Post-validation of a translation: `false` when the text still reads
    /// as English.
    ///
    /// Code is judged by its string literals only, so code with English
    /// comments or without user-visible strings passes. Anything else needs
    /// at least one target indicator (a script character for non-Latin
    /// targets) and no fewer target than English indicators.
    pub fn appears_translated(&self, text: &str) -> bool {
        let score = self.score(text);
        let verdict = score.words == 0 || (score.target > 0 && score.target >= score.english);
        debug!(
            language = self.language.code(),
            words = score.words,
            target = score.target,
            english = score.english,
            verdict,
            "language check"
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fr() -> LanguageDetector {
        LanguageDetector::new(Language::French)
    }

    #[test]
    fn test_french_prose_detection() {
        let d = fr();
        assert!(d.appears_translated("Composants Serveur"));
        assert!(d.appears_translated("Actions Serveur"));
        assert!(!d.appears_translated("Server Components"));
        assert!(!d.appears_translated("Server Actions"));
        assert!(d.appears_translated("Le guide de référence"));
        assert!(!d.appears_translated("The reference guide"));
        assert!(d.appears_translated("Documentation pour les composants"));
        assert!(!d.appears_translated("Documentation for components"));
    }

    #[test]
    fn test_json_values_are_judged() {
        let d = fr();
        assert!(d.appears_translated(r#""title": "Composants Serveur""#));
        assert!(!d.appears_translated(r#""title": "Server Components""#));
    }

    #[test]
    fn test_code_is_judged_by_string_literals() {
        let d = fr();
        assert!(d.appears_translated(
            "// Copiez le tableau!\n  const storiesToDisplay = stories.slice();"
        ));
        assert!(d.appears_translated(
            "// Copy the array!\n  const storiesToDisplay = stories.slice();"
        ));
        assert!(d.appears_translated("const x = 5;"));
        assert!(d.appears_translated("function test() { return true; }"));
        assert!(d.appears_translated("let initialStories = []"));
        assert!(d.appears_translated("export default function App() {"));

        let french = "const initialStories = [\n  {id: 0, label: \"L'histoire d'Ankit\" },\n  {id: 1, label: \"L'histoire de Taylor\" },\n];";
        assert!(d.appears_translated(french));

        let english = "const initialStories = [\n  {id: 0, label: \"Ankit's Story\" },\n  {id: 1, label: \"Taylor's Story\" },\n];";
        assert!(!d.appears_translated(english));
    }

    #[test]
    fn test_non_latin_targets_need_script_characters() {
        let ja = LanguageDetector::new(Language::Japanese);
        assert!(ja.appears_translated("サーバーコンポーネント"));
        assert!(!ja.appears_translated("Learn how to use the server components"));

        let ru = LanguageDetector::new(Language::Russian);
        assert!(ru.appears_translated("Серверные компоненты"));
        assert!(!ru.appears_translated("Server Components"));
    }

    #[test]
    fn test_untranslated_text_without_english_keywords_fails() {
        let d = fr();
        assert!(!d.appears_translated("Hello world"));
        assert!(!d.appears_translated("const msg = \"Hello world\";"));
        assert!(d.appears_translated("const msg = \"Bonjour le monde\";"));

        let ja = LanguageDetector::new(Language::Japanese);
        assert!(!ja.appears_translated("Hello world"));
        assert!(ja.appears_translated("React のコンポーネント"));

        let ru = LanguageDetector::new(Language::Russian);
        assert!(!ru.appears_translated("Getting Started"));
    }

    #[test]
    fn test_english_homographs_do_not_count_as_target() {
        let cases = [
            (Language::Portuguese, "Set up the project as described"),
            (Language::Portuguese, "Do it now"),
            (Language::Italian, "Come back later"),
            (Language::Italian, "Non profit work per hour"),
            (Language::Spanish, "Son of Anton"),
            (Language::French, "Above par"),
            (Language::German, "Ships die here"),
        ];
        for (language, text) in cases {
            assert!(
                !LanguageDetector::new(language).appears_translated(text),
                "{} accepted as {}",
                text,
                language
            );
        }
        let pt = LanguageDetector::new(Language::Portuguese);
        assert!(pt.appears_translated("Configure o projeto para você"));
    }

    #[test]
    fn test_looks_like_code() {
        assert!(LanguageDetector::looks_like_code("const x = 5;"));
        assert!(LanguageDetector::looks_like_code("\"title\": \"Hello\","));
        assert!(!LanguageDetector::looks_like_code("React lets you build user interfaces."));
        // Tags alone do not turn surrounding prose into code.
        assert!(!LanguageDetector::looks_like_code(
            "<Intro>\n\nReact lets you build user interfaces.\n\n</Intro>"
        ));
    }

    #[test]
    fn test_extract_separates_parts() {
        let text = "Some intro text with `inline()` code.\n\n```js\nconst msg = \"Hello there\"; // greet\nimport x from 'react';\n```\n";
        let ex = LanguageDetector::extract(text);
        assert_eq!(ex.prose, vec!["Some intro text with   code.".to_string()]);
        assert_eq!(ex.literals, vec!["Hello there".to_string()]);
        assert_eq!(ex.comments, vec!["greet".to_string()]);
    }

    #[test]
    fn test_translatable_text_of_code() {
        let text = "const msg = \"Hello there\"; // greet\nconst n = 5;";
        assert_eq!(LanguageDetector::translatable_text(text), "Hello there\ngreet");
        assert_eq!(LanguageDetector::translatable_text("const x = 5;"), "");
    }

    #[test]
    fn test_jsx_text_is_a_literal() {
        let ex = LanguageDetector::extract("return <h1>Hello world</h1>;");
        assert_eq!(ex.literals, vec!["Hello world".to_string()]);
    }

    #[test]
    fn test_url_literal_is_not_a_comment() {
        let ex = LanguageDetector::extract("import x from 'https://esm.sh/react';");
        assert!(ex.comments.is_empty());
        assert!(ex.literals.is_empty());
    }

    #[test]
    fn test_needs_translation() {
        assert!(LanguageDetector::needs_translation("Server Components"));
        assert!(LanguageDetector::needs_translation("// Copy the array!\nconst a = b;"));
        assert!(!LanguageDetector::needs_translation("const x = 5;"));
        assert!(!LanguageDetector::needs_translation("import { useState } from 'react';"));
        assert!(!LanguageDetector::needs_translation("42"));
    }

    #[test]
    fn test_skeleton_ignores_translated_parts() {
        let en = "const label = \"Ankit's Story\"; // the label\nrender(label);";
        let fr = "const label = \"L'histoire d'Ankit\"; // le libellé\nrender(label);";
        assert_eq!(LanguageDetector::skeleton(en), LanguageDetector::skeleton(fr));

        let changed = "const label = \"L'histoire d'Ankit\";\nrenderTwice(label);";
        assert_ne!(LanguageDetector::skeleton(en), LanguageDetector::skeleton(changed));
    }

    #[test]
    fn test_skeleton_drops_prose() {
        assert_eq!(LanguageDetector::skeleton("Just some prose."), "");
        assert_eq!(LanguageDetector::skeleton("Juste du texte."), "");
    }

    #[test]
    fn test_score_counts_possessives_as_english() {
        let score = fr().score("Ankit's Story");
        assert_eq!(score.words, 2);
        assert_eq!(score.english, 2);
        assert_eq!(score.target, 0);
    }
}
