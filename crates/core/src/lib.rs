//! lingomerge core library.
//!
//! This crate provides the building blocks for resolving translation merge
//! conflicts in documentation repositories: configuration, conflict-block
//! parsing and rendering, target-language heuristics, the LLM client, the
//! file scanner, and the per-conflict processing pipeline.

pub mod closeness;
pub mod config;
pub mod conflict;
pub mod errors;
pub mod language;
pub mod llm;
pub mod processor;
pub mod report;
pub mod scanner;

// Re-exports for convenience.
pub use config::AppConfig;
pub use conflict::{ConflictParser, ConflictResolver, IncomingSide, Resolution};
pub use errors::CoreError;
pub use language::{Language, LanguageDetector};
pub use llm::{ClosenessVerdict, OpenAiClient, TranslationService};
pub use processor::{ConflictProcessor, PauseGate};
pub use report::{ConflictOutcome, FileReport, OutcomeKind, RunSummary};
pub use scanner::{ConflictFile, Scanner};
