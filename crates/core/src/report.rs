//! Per-conflict outcomes and run summaries.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::conflict::{ParseWarning, Resolution};

/// What happened to one conflict block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    KeptExisting,
    AcceptedIncoming,
    Translated,
    Failed,
}

impl OutcomeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::KeptExisting => "kept",
            Self::AcceptedIncoming => "accepted",
            Self::Translated => "translated",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictOutcome {
    /// Block ordinal within its file.
    pub index: usize,
    pub start_line: usize,
    pub kind: OutcomeKind,
    pub reason: Option<String>,
    pub error: Option<String>,
    pub incoming: String,
    pub current: String,
    /// New text for `Translated` outcomes.
    pub resolved_text: Option<String>,
    pub elapsed_ms: u64,
}

impl ConflictOutcome {
    pub fn resolution(&self) -> Resolution {
        match (self.kind, &self.resolved_text) {
            (OutcomeKind::KeptExisting, _) => Resolution::KeepCurrent,
            (OutcomeKind::AcceptedIncoming, _) => Resolution::AcceptIncoming,
            (OutcomeKind::Translated, Some(text)) => Resolution::Replace(text.clone()),
            (OutcomeKind::Translated, None) | (OutcomeKind::Failed, _) => Resolution::Unresolved,
        }
    }

    /// The text the block now reads as, `None` when it stays unresolved.
    pub fn final_text(&self) -> Option<&str> {
        match self.kind {
            OutcomeKind::KeptExisting => Some(&self.current),
            OutcomeKind::AcceptedIncoming => Some(&self.incoming),
            OutcomeKind::Translated => self.resolved_text.as_deref(),
            OutcomeKind::Failed => None,
        }
    }
}

/// Result of processing one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub rel_path: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub outcomes: Vec<ConflictOutcome>,
    pub warnings: Vec<ParseWarning>,
    /// The file was (or, in a dry run, would have been) rewritten.
    pub changed: bool,
    pub written: bool,
    pub write_error: Option<String>,
    /// Original and rendered text, kept only for dry-run diffs.
    #[serde(skip)]
    pub original: Option<String>,
    #[serde(skip)]
    pub rendered: Option<String>,
}

impl FileReport {
    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes.iter().filter(|o| o.kind == kind).count()
    }

    pub fn resolved(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.kind != OutcomeKind::Failed)
            .count()
    }

    /// Unified diff between the original and rendered content.
    pub fn diff(&self) -> Option<String> {
        let original = self.original.as_deref()?;
        let rendered = self.rendered.as_deref()?;
        Some(diffy::create_patch(original, rendered).to_string())
    }

    /// Drop the file contents once the diff has been shown.
    pub fn discard_content(&mut self) {
        self.original = None;
        self.rendered = None;
    }
}

/// Totals for a whole run, written by `--report`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub language: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    pub files_processed: usize,
    pub files_written: usize,
    pub conflicts: usize,
    pub kept_existing: usize,
    pub accepted_incoming: usize,
    pub translated: usize,
    pub failed: usize,
    pub files: Vec<FileReport>,
}

impl RunSummary {
    pub fn new(language: impl Into<String>, dry_run: bool) -> Self {
        Self {
            language: language.into(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            elapsed_ms: 0,
            files_processed: 0,
            files_written: 0,
            conflicts: 0,
            kept_existing: 0,
            accepted_incoming: 0,
            translated: 0,
            failed: 0,
            files: Vec::new(),
        }
    }

    pub fn record(&mut self, report: FileReport) {
        self.files_processed += 1;
        if report.written {
            self.files_written += 1;
        }
        for outcome in &report.outcomes {
            self.conflicts += 1;
            match outcome.kind {
                OutcomeKind::KeptExisting => self.kept_existing += 1,
                OutcomeKind::AcceptedIncoming => self.accepted_incoming += 1,
                OutcomeKind::Translated => self.translated += 1,
                OutcomeKind::Failed => self.failed += 1,
            }
        }
        self.files.push(report);
    }

    pub fn finish(&mut self) {
        let now = Utc::now();
        self.elapsed_ms = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.finished_at = Some(now);
    }

    pub fn resolved(&self) -> usize {
        self.conflicts - self.failed
    }

    /// Conflicts decided per second over the whole run.
    pub fn rate(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        self.conflicts as f64 * 1000.0 / self.elapsed_ms as f64
    }

    /// Files rewritten, or in a dry run the files that would have been.
    pub fn changed_files(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .filter(move |f| if self.dry_run { f.changed } else { f.written })
            .map(|f| f.rel_path.as_str())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
