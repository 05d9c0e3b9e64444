//! The per-conflict decision pipeline.
//!
//! For every block [`ConflictProcessor`] runs the local pre-checks, asks the
//! [`TranslationService`] for a closeness verdict when needed, translates,
//! and validates the translation. Each file is rendered once all of its
//! blocks are decided and written atomically unless running dry.
//!
//! Any API or validation failure marks the block `Failed`; it keeps its
//! conflict markers for manual review.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::closeness::{precheck, Precheck, TranslateReason};
use crate::config::AppConfig;
use crate::conflict::{ConflictBlock, ConflictResolver, IncomingSide, Resolution};
use crate::errors::{LlmError, ResolveError};
use crate::language::{Language, LanguageDetector};
use crate::llm::TranslationService;
use crate::report::{ConflictOutcome, FileReport, OutcomeKind};
use crate::scanner::ConflictFile;

/// Callback invoked as each conflict is decided: `(rel_path, outcome)`.
pub type OutcomeObserver = Arc<dyn Fn(&str, &ConflictOutcome) + Send + Sync>;

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// Enforces a minimum interval between API calls across all workers.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<tokio::time::Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Wait until the next call is allowed.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let next = prev + self.min_interval;
            if next > tokio::time::Instant::now() {
                tokio::time::sleep_until(next).await;
            }
        }
        *last = Some(tokio::time::Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Pause control
// ---------------------------------------------------------------------------

/// Shared pause switch. Conflicts not yet started wait at the gate while it
/// is closed; requests already in flight finish normally.
#[derive(Debug, Clone)]
pub struct PauseGate {
    paused: Arc<watch::Sender<bool>>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            paused: Arc::new(tx),
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.send_replace(paused);
    }

    /// Flip the state; returns `true` when now paused.
    pub fn toggle(&self) -> bool {
        let mut now = false;
        self.paused.send_modify(|paused| {
            *paused = !*paused;
            now = *paused;
        });
        info!(paused = now, "pause toggled");
        now
    }

    /// Return once the gate is open.
    pub async fn wait(&self) {
        let mut rx = self.paused.subscribe();
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ConflictProcessor {
    service: Arc<dyn TranslationService>,
    detector: LanguageDetector,
    side: IncomingSide,
    workers: usize,
    limiter: Arc<RateLimiter>,
    dry_run: bool,
    observer: Option<OutcomeObserver>,
    pause: PauseGate,
}

impl ConflictProcessor {
    pub fn new(service: Arc<dyn TranslationService>, language: Language, config: &AppConfig) -> Self {
        Self {
            service,
            detector: LanguageDetector::new(language),
            side: config.conflicts.incoming_side,
            workers: config.processing.workers.max(1),
            limiter: Arc::new(RateLimiter::new(Duration::from_millis(
                config.processing.rate_limit_ms,
            ))),
            dry_run: false,
            observer: None,
            pause: PauseGate::new(),
        }
    }

    /// Decide and render, but never write files.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_observer(
        mut self,
        observer: impl Fn(&str, &ConflictOutcome) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Share a pause switch with the caller.
    pub fn with_pause_gate(mut self, gate: PauseGate) -> Self {
        self.pause = gate;
        self
    }

    pub fn language(&self) -> Language {
        self.detector.language()
    }

    /// Decide every conflict of `file`, then render and write it.
    pub async fn process_file(&self, file: &ConflictFile) -> FileReport {
        let total = file.conflict_count();
        info!(path = %file.rel_path, conflicts = total, "processing file");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for block in file.document.conflicts() {
            let this = self.clone();
            let block = block.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                this.decide(&block).await
            });
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if let Some(observer) = &self.observer {
                        observer(&file.rel_path, &outcome);
                    }
                    outcomes.push(outcome);
                }
                Err(e) => warn!(path = %file.rel_path, error = %e, "conflict task failed"),
            }
        }
        outcomes.sort_by_key(|o| o.index);

        let mut resolutions = vec![Resolution::Unresolved; total];
        for outcome in &outcomes {
            if let Some(slot) = resolutions.get_mut(outcome.index) {
                *slot = outcome.resolution();
            }
        }

        let mut report = FileReport {
            rel_path: file.rel_path.clone(),
            path: file.path.clone(),
            outcomes,
            warnings: file.document.warnings.clone(),
            changed: false,
            written: false,
            write_error: None,
            original: self.dry_run.then(|| file.content.clone()),
            rendered: None,
        };

        if !resolutions.iter().any(Resolution::is_resolved) {
            info!(path = %file.rel_path, "no conflicts resolved, file left untouched");
            return report;
        }

        let rendered = match ConflictResolver::render(&file.document, &resolutions, self.side) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(path = %file.rel_path, error = %e, "render failed");
                report.write_error = Some(e.to_string());
                return report;
            }
        };
        report.changed = rendered != file.content;

        if report.changed && !self.dry_run {
            match write_atomic(&file.path, &rendered) {
                Ok(()) => {
                    info!(path = %file.rel_path, resolved = report.resolved(), "file written");
                    report.written = true;
                }
                Err(e) => {
                    warn!(path = %file.rel_path, error = %e, "write failed");
                    report.write_error = Some(e.to_string());
                }
            }
        }
        // Rendered text is only kept for dry-run diffs.
        if self.dry_run {
            report.rendered = Some(rendered);
        }
        report
    }

    /// Run the decision pipeline for one block.
    pub async fn decide(&self, block: &ConflictBlock) -> ConflictOutcome {
        self.pause.wait().await;
        let started = Instant::now();
        let incoming = block.incoming_text(self.side);
        let current = block.current_text(self.side);

        let mut outcome = ConflictOutcome {
            index: block.index,
            start_line: block.start_line,
            kind: OutcomeKind::Failed,
            reason: None,
            error: None,
            incoming: incoming.to_string(),
            current: current.to_string(),
            resolved_text: None,
            elapsed_ms: 0,
        };

        match precheck(&self.detector, incoming, current) {
            Precheck::AcceptIncoming => {
                outcome.kind = OutcomeKind::AcceptedIncoming;
                outcome.reason = Some("nothing to translate".into());
            }
            Precheck::Translate(reason) => {
                self.translate_into(&mut outcome, reason, None).await;
            }
            Precheck::AskApi => {
                self.limiter.wait().await;
                match self
                    .service
                    .check_closeness(incoming, current, self.language())
                    .await
                {
                    Ok(verdict) if verdict.close_enough => {
                        outcome.kind = OutcomeKind::KeptExisting;
                        outcome.reason = Some(
                            verdict
                                .reason
                                .unwrap_or_else(|| "existing translation is close enough".into()),
                        );
                    }
                    Ok(verdict) => {
                        let reason = TranslateReason::NotCloseEnough;
                        self.translate_into(&mut outcome, reason, verdict.reason)
                            .await;
                    }
                    Err(e) => fail(&mut outcome, &e),
                }
            }
        }

        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        if outcome.kind == OutcomeKind::Failed {
            warn!(
                index = block.index,
                line = block.start_line,
                error = outcome.error.as_deref().unwrap_or_default(),
                "conflict left for manual review"
            );
        } else {
            debug!(index = block.index, kind = %outcome.kind, "conflict decided");
        }
        outcome
    }

    async fn translate_into(
        &self,
        outcome: &mut ConflictOutcome,
        reason: TranslateReason,
        detail: Option<String>,
    ) {
        outcome.reason = Some(match detail {
            Some(detail) => format!("{}: {}", reason, detail),
            None => reason.to_string(),
        });

        self.limiter.wait().await;
        match self.service.translate(&outcome.incoming, self.language()).await {
            Ok(text) if self.detector.appears_translated(&text) => {
                outcome.kind = OutcomeKind::Translated;
                outcome.resolved_text = Some(text);
            }
            Ok(_) => fail(
                outcome,
                &LlmError::ValidationFailed {
                    language: self.language().name().to_string(),
                },
            ),
            Err(e) => fail(outcome, &e),
        }
    }
}

fn fail(outcome: &mut ConflictOutcome, error: &LlmError) {
    outcome.kind = OutcomeKind::Failed;
    outcome.error = Some(error.to_string());
}

/// Replace `path` with `content` through a temp file in the same directory.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), ResolveError> {
    let write_failed = |detail: String| ResolveError::WriteFailed {
        path: path.display().to_string(),
        detail,
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    if let Ok(meta) = std::fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    tmp.persist(path)
        .map_err(|e| write_failed(e.error.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictParser;
    use crate::llm::ClosenessVerdict;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Scripted service: fixed verdict and translation, counting calls.
    struct FakeService {
        close_enough: bool,
        translation: Result<String, u16>,
        closeness_calls: AtomicUsize,
        translate_calls: AtomicUsize,
    }

    impl FakeService {
        fn new(close_enough: bool, translation: Result<&str, u16>) -> Self {
            Self {
                close_enough,
                translation: translation.map(String::from),
                closeness_calls: AtomicUsize::new(0),
                translate_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TranslationService for FakeService {
        async fn check_closeness(
            &self,
            _incoming: &str,
            _current: &str,
            _language: Language,
        ) -> Result<ClosenessVerdict, LlmError> {
            self.closeness_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ClosenessVerdict {
                close_enough: self.close_enough,
                reason: Some("scripted".into()),
            })
        }

        async fn translate(&self, _text: &str, _language: Language) -> Result<String, LlmError> {
            self.translate_calls.fetch_add(1, Ordering::SeqCst);
            self.translation.clone().map_err(|status| LlmError::ApiError {
                status,
                body: "scripted failure".into(),
            })
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.processing.rate_limit_ms = 0;
        config
    }

    fn processor(service: Arc<FakeService>) -> ConflictProcessor {
        ConflictProcessor::new(service, Language::French, &config())
    }

    fn block(current: &str, incoming: &str) -> ConflictBlock {
        let content = format!("<<<<<<< HEAD\n{}\n=======\n{}\n>>>>>>> main\n", current, incoming);
        let doc = ConflictParser::parse(&content);
        let block = doc.conflicts().next().cloned().unwrap();
        block
    }

    fn conflict_file(dir: &TempDir, name: &str, content: &str) -> ConflictFile {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        ConflictFile {
            path,
            rel_path: name.to_string(),
            content: content.to_string(),
            document: ConflictParser::parse(content),
        }
    }

    #[tokio::test]
    async fn test_close_translation_is_kept() {
        let service = Arc::new(FakeService::new(true, Ok("unused")));
        let outcome = processor(service.clone())
            .decide(&block("Le guide de référence", "The reference guide"))
            .await;
        assert_eq!(outcome.kind, OutcomeKind::KeptExisting);
        assert_eq!(outcome.reason.as_deref(), Some("scripted"));
        assert_eq!(service.closeness_calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.translate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drifted_translation_is_replaced() {
        let service = Arc::new(FakeService::new(false, Ok("Le nouveau guide de référence")));
        let outcome = processor(service.clone())
            .decide(&block("Le guide de référence", "The new reference guide"))
            .await;
        assert_eq!(outcome.kind, OutcomeKind::Translated);
        assert_eq!(
            outcome.resolved_text.as_deref(),
            Some("Le nouveau guide de référence")
        );
        assert!(outcome.reason.unwrap().contains("scripted"));
    }

    #[tokio::test]
    async fn test_code_only_accepts_incoming_without_api() {
        let service = Arc::new(FakeService::new(true, Ok("unused")));
        let outcome = processor(service.clone())
            .decide(&block("const x = 4;", "const x = 5;"))
            .await;
        assert_eq!(outcome.kind, OutcomeKind::AcceptedIncoming);
        assert_eq!(service.closeness_calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.translate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_english_translation_fails_validation() {
        let service = Arc::new(FakeService::new(false, Ok("The Server Components")));
        let outcome = processor(service.clone())
            .decide(&block("", "Server Components"))
            .await;
        assert_eq!(outcome.kind, OutcomeKind::Failed);
        assert!(outcome.error.unwrap().contains("French"));
        assert_eq!(service.closeness_calls.load(Ordering::SeqCst), 0);
    }

    /// Returns the source text unchanged, like a model that ignored the
    /// instruction.
    struct EchoService;

    #[async_trait]
    impl TranslationService for EchoService {
        async fn check_closeness(
            &self,
            _incoming: &str,
            _current: &str,
            _language: Language,
        ) -> Result<ClosenessVerdict, LlmError> {
            Ok(ClosenessVerdict {
                close_enough: false,
                reason: None,
            })
        }

        async fn translate(&self, text: &str, _language: Language) -> Result<String, LlmError> {
            Ok(text.to_string())
        }
    }

    #[tokio::test]
    async fn test_echoed_source_fails_validation() {
        for language in [Language::Japanese, Language::French] {
            let outcome = ConflictProcessor::new(Arc::new(EchoService), language, &config())
                .decide(&block("", "Hello world"))
                .await;
            assert_eq!(outcome.kind, OutcomeKind::Failed, "{}", language);
            assert!(outcome.resolved_text.is_none());
            assert_eq!(outcome.resolution(), Resolution::Unresolved);
        }
    }

    #[tokio::test]
    async fn test_api_error_fails() {
        let service = Arc::new(FakeService::new(false, Err(500)));
        let outcome = processor(service)
            .decide(&block("Server Components", "Server Components"))
            .await;
        assert_eq!(outcome.kind, OutcomeKind::Failed);
        assert!(outcome.error.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_process_file_writes_resolved_blocks() {
        let dir = TempDir::new().unwrap();
        let content = "# Titre\n<<<<<<< HEAD\nLe guide de référence\n=======\nThe reference guide\n>>>>>>> main\nfin\n";
        let file = conflict_file(&dir, "page.md", content);

        let service = Arc::new(FakeService::new(true, Ok("unused")));
        let report = processor(service).process_file(&file).await;

        assert!(report.written);
        assert_eq!(report.count(OutcomeKind::KeptExisting), 1);
        assert!(report.original.is_none());
        assert!(report.rendered.is_none());
        let written = std::fs::read_to_string(&file.path).unwrap();
        assert_eq!(written, "# Titre\nLe guide de référence\nfin\n");
    }

    #[tokio::test]
    async fn test_process_file_failure_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let content = "<<<<<<< HEAD\n=======\nServer Components\n>>>>>>> main\n";
        let file = conflict_file(&dir, "page.md", content);

        let service = Arc::new(FakeService::new(false, Err(429)));
        let report = processor(service).process_file(&file).await;

        assert!(!report.written);
        assert!(report.rendered.is_none());
        assert_eq!(report.count(OutcomeKind::Failed), 1);
        assert_eq!(std::fs::read_to_string(&file.path).unwrap(), content);
    }

    #[tokio::test]
    async fn test_process_file_dry_run_does_not_write() {
        let dir = TempDir::new().unwrap();
        let content = "<<<<<<< HEAD\n=======\nServer Components\n>>>>>>> main\n";
        let file = conflict_file(&dir, "page.md", content);

        let service = Arc::new(FakeService::new(false, Ok("Composants Serveur")));
        let report = processor(service).dry_run(true).process_file(&file).await;

        assert!(report.changed);
        assert!(!report.written);
        assert_eq!(report.rendered.as_deref(), Some("Composants Serveur\n"));
        assert!(report.diff().unwrap().contains("+Composants Serveur"));
        assert_eq!(std::fs::read_to_string(&file.path).unwrap(), content);
    }

    #[tokio::test]
    async fn test_process_file_concurrent_workers_keep_order() {
        let dir = TempDir::new().unwrap();
        let mut content = String::new();
        for i in 0..6 {
            content.push_str(&format!(
                "<<<<<<< HEAD\n=======\nServer Components {}\n>>>>>>> main\n",
                i
            ));
        }
        let file = conflict_file(&dir, "many.md", &content);

        let mut config = config();
        config.processing.workers = 3;
        let service = Arc::new(FakeService::new(false, Ok("Composants Serveur")));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let report = ConflictProcessor::new(service.clone(), Language::French, &config)
            .with_observer(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .process_file(&file)
            .await;

        assert_eq!(seen.load(Ordering::SeqCst), 6);
        assert_eq!(service.translate_calls.load(Ordering::SeqCst), 6);
        let indices: Vec<_> = report.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(
            std::fs::read_to_string(&file.path).unwrap(),
            "Composants Serveur\n".repeat(6)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_gate_holds_until_resumed() {
        let gate = PauseGate::new();
        assert!(tokio::time::timeout(Duration::from_millis(10), gate.wait())
            .await
            .is_ok());

        assert!(gate.toggle());
        assert!(gate.is_paused());
        assert!(tokio::time::timeout(Duration::from_secs(5), gate.wait())
            .await
            .is_err());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };
        gate.set_paused(false);
        assert!(tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_processor_does_not_call_service() {
        let gate = PauseGate::new();
        gate.set_paused(true);
        let service = Arc::new(FakeService::new(false, Ok("Composants Serveur")));
        let processor = processor(service.clone()).with_pause_gate(gate.clone());
        let task = {
            let block = block("", "Server Components");
            tokio::spawn(async move { processor.decide(&block).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(service.translate_calls.load(Ordering::SeqCst), 0);

        gate.toggle();
        let outcome = task.await.unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Translated);
        assert_eq!(service.translate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_spaces_calls() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        let start = tokio::time::Instant::now();
        for _ in 0..3 {
            limiter.wait().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        std::fs::write(&path, "old").unwrap();
        write_atomic(&path, "new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
