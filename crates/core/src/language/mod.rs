//! Target languages and the heuristics used to recognise them.
//!
//! Detection is deliberately cheap: character sets (accents or scripts) and
//! short keyword lists. It only has to answer "does this still look like
//! English?" after a translation, not identify arbitrary languages.

pub mod detector;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use detector::LanguageDetector;

/// A translation target language.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    French,
    Spanish,
    German,
    Italian,
    Portuguese,
    Japanese,
    Chinese,
    Korean,
    Russian,
}

/// How a language is recognised in text.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Latin alphabet: recognised by accented letters, keywords and elisions.
    Latin {
        accents: &'static str,
        keywords: &'static [&'static str],
        elisions: &'static [&'static str],
    },
    /// Non-Latin script: recognised by characters in the given ranges.
    Ranges(&'static [(char, char)]),
}

impl Language {
    pub const ALL: [Language; 9] = [
        Self::French,
        Self::Spanish,
        Self::German,
        Self::Italian,
        Self::Portuguese,
        Self::Japanese,
        Self::Chinese,
        Self::Korean,
        Self::Russian,
    ];

    /// ISO 639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::French => "fr",
            Self::Spanish => "es",
            Self::German => "de",
            Self::Italian => "it",
            Self::Portuguese => "pt",
            Self::Japanese => "ja",
            Self::Chinese => "zh",
            Self::Korean => "ko",
            Self::Russian => "ru",
        }
    }

    /// English name, used in prompts and output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::French => "French",
            Self::Spanish => "Spanish",
            Self::German => "German",
            Self::Italian => "Italian",
            Self::Portuguese => "Portuguese",
            Self::Japanese => "Japanese",
            Self::Chinese => "Chinese",
            Self::Korean => "Korean",
            Self::Russian => "Russian",
        }
    }

    pub fn script(&self) -> Script {
        match self {
            Self::French => Script::Latin {
                accents: "éèêëàâîïôûùüÿçœæÉÈÊËÀÂÎÏÔÛÙÜŸÇŒÆ",
                keywords: &[
                    "le", "la", "les", "de", "des", "du", "une", "et", "est", "sont", "pour",
                    "avec", "dans", "vous", "votre", "vos", "nous", "qui", "que", "cette",
                    "ces", "aux", "au", "ou", "mais", "comme",
                    "composant", "composants", "serveur", "serveurs", "fonction",
                    "exemple", "histoire", "tableau", "liste", "utiliser", "référence",
                ],
                elisions: &["l'", "d'", "qu'", "n'", "j'", "c'", "s'", "m'", "jusqu'"],
            },
            Self::Spanish => Script::Latin {
                accents: "áéíóúñüÁÉÍÓÚÑÜ¿¡",
                keywords: &[
                    "el", "los", "las", "de", "del", "una", "unos", "es", "para", "por",
                    "como", "pero", "que", "este", "esta", "estos", "sus", "usted",
                    "componente", "componentes", "servidor", "función", "ejemplo", "lista",
                    "usar",
                ],
                elisions: &[],
            },
            Self::German => Script::Latin {
                accents: "äöüßÄÖÜ",
                keywords: &[
                    "der", "das", "dem", "des", "ein", "eine", "einen", "und", "ist", "sind",
                    "mit", "für", "auf", "nicht", "sie", "wir", "oder", "aber", "wenn",
                    "diese", "dieser", "komponente", "komponenten", "beispiel", "verwenden",
                ],
                elisions: &[],
            },
            Self::Italian => Script::Latin {
                accents: "àèéìíòóùÀÈÉÌÍÒÓÙ",
                keywords: &[
                    "il", "gli", "di", "della", "delle", "dei", "degli", "una", "uno",
                    "è", "sono", "che", "questo", "questa", "componente", "componenti",
                    "esempio", "usare",
                ],
                elisions: &["l'", "un'", "dell'", "all'", "nell'", "dall'", "sull'"],
            },
            Self::Portuguese => Script::Latin {
                accents: "áàâãéêíóôõúçÁÀÂÃÉÊÍÓÔÕÚÇ",
                keywords: &[
                    "uma", "de", "da", "dos", "das", "é", "são", "para", "com", "por", "não",
                    "que", "você", "seu", "sua", "este", "esta", "componente", "componentes",
                    "servidor", "exemplo", "usar",
                ],
                elisions: &[],
            },
            Self::Japanese => Script::Ranges(&[
                ('\u{3040}', '\u{309F}'),
                ('\u{30A0}', '\u{30FF}'),
                ('\u{4E00}', '\u{9FFF}'),
            ]),
            Self::Chinese => Script::Ranges(&[('\u{4E00}', '\u{9FFF}'), ('\u{3400}', '\u{4DBF}')]),
            Self::Korean => Script::Ranges(&[('\u{AC00}', '\u{D7AF}'), ('\u{1100}', '\u{11FF}')]),
            Self::Russian => Script::Ranges(&[('\u{0400}', '\u{04FF}')]),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = String;

    /// Accepts either the ISO code (`fr`) or the English name (`french`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|lang| lang.code() == needle || lang.name().to_lowercase() == needle)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|l| l.code()).collect();
                format!("unknown language '{}' (known: {})", s, known.join(", "))
            })
    }
}

/// Common English function words, used to score how English a text looks.
pub(crate) const ENGLISH_KEYWORDS: &[&str] = &[
    "the", "and", "of", "to", "is", "are", "for", "with", "this", "that", "you", "your",
    "it", "be", "can", "will", "from", "by", "when", "how", "what", "which", "not", "or",
    "if", "use", "using", "an", "we", "our", "has", "have", "should", "would", "story",
    "server", "components", "component", "actions", "reference", "guide", "learn",
];
