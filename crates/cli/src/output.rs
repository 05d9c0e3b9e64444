//! Progress, per-conflict lines, diffs and summary tables.

use std::time::Duration;

use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};

use lingomerge_core::{ConflictFile, ConflictOutcome, FileReport, OutcomeKind, RunSummary};

use crate::style;

/// First line of `text`, shortened to `max` characters.
pub fn preview(text: &str, max: usize) -> String {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    let more_lines = text.trim().lines().count() > 1;
    let mut out: String = first.chars().take(max).collect();
    if first.chars().count() > max || more_lines {
        out.push('…');
    }
    if out.is_empty() {
        out.push_str("(empty)");
    }
    out
}

/// One line per decided conflict: label, location, incoming -> resolved.
pub fn outcome_line(rel_path: &str, outcome: &ConflictOutcome) -> String {
    let location = style::dim(&format!("{}:{}", rel_path, outcome.start_line));
    let detail = match outcome.kind {
        OutcomeKind::Failed => outcome
            .error
            .clone()
            .unwrap_or_else(|| "unknown error".to_string()),
        _ => format!(
            "{} → {}",
            preview(&outcome.incoming, 40),
            preview(outcome.final_text().unwrap_or_default(), 40)
        ),
    };
    format!("  {} {}  {}", style::outcome(outcome.kind), location, detail)
}

/// Colored unified diff of a rendered file, `None` when nothing changed.
pub fn file_diff(report: &FileReport) -> Option<String> {
    if !report.changed {
        return None;
    }
    let patch = report.diff()?;
    let lines: Vec<String> = patch.lines().map(style::diff_line).collect();
    Some(lines.join("\n"))
}

pub fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.blue} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn new_table(color: bool) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    if !color {
        table.force_no_tty();
    }
    table
}

/// Per-file conflict listing for `scan`.
pub fn scan_table(files: &[ConflictFile], color: bool) -> Table {
    let mut table = new_table(color);
    table.set_header(vec!["File", "Conflicts", "Lines", "Warnings"]);
    for file in files {
        let lines: Vec<String> = file
            .document
            .conflicts()
            .map(|b| format!("{}-{}", b.start_line, b.end_line))
            .collect();
        let warnings = file.document.warnings.len();
        table.add_row(vec![
            Cell::new(&file.rel_path),
            Cell::new(file.conflict_count()),
            Cell::new(lines.join(", ")),
            if warnings > 0 {
                Cell::new(warnings).fg(Color::Yellow)
            } else {
                Cell::new("—")
            },
        ]);
    }
    table
}

/// Totals table printed at the end of `resolve`.
pub fn summary_table(summary: &RunSummary, color: bool) -> Table {
    let mut table = new_table(color);
    table.set_header(vec!["Outcome", "Conflicts"]);
    table.add_row(vec![
        Cell::new("= kept existing").fg(Color::Blue),
        Cell::new(summary.kept_existing),
    ]);
    table.add_row(vec![
        Cell::new("→ accepted incoming").fg(Color::Cyan),
        Cell::new(summary.accepted_incoming),
    ]);
    table.add_row(vec![
        Cell::new("✓ translated").fg(Color::Green),
        Cell::new(summary.translated),
    ]);
    table.add_row(vec![
        Cell::new("✗ failed").fg(Color::Red),
        Cell::new(summary.failed),
    ]);
    table.add_row(vec![Cell::new("total"), Cell::new(summary.conflicts)]);
    table.add_row(vec![
        Cell::new(if summary.dry_run {
            "files changed (dry run)"
        } else {
            "files written"
        }),
        Cell::new(if summary.dry_run {
            summary.files.iter().filter(|f| f.changed).count()
        } else {
            summary.files_written
        }),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("Hello world", 5), "Hello…");
        assert_eq!(preview("Hello", 10), "Hello");
        assert_eq!(preview("\nFirst\nSecond\n", 10), "First…");
        assert_eq!(preview("   ", 10), "(empty)");
    }

    #[test]
    fn test_outcome_line_for_failure() {
        console::set_colors_enabled(false);
        let outcome = ConflictOutcome {
            index: 0,
            start_line: 12,
            kind: OutcomeKind::Failed,
            reason: None,
            error: Some("LLM API error (HTTP 500): boom".into()),
            incoming: "Hello".into(),
            current: String::new(),
            resolved_text: None,
            elapsed_ms: 0,
        };
        let line = outcome_line("docs/a.md", &outcome);
        assert!(line.contains("docs/a.md:12"));
        assert!(line.contains("HTTP 500"));
    }

    #[test]
    fn test_outcome_line_preview() {
        console::set_colors_enabled(false);
        let outcome = ConflictOutcome {
            index: 0,
            start_line: 3,
            kind: OutcomeKind::Translated,
            reason: None,
            error: None,
            incoming: "Server Components".into(),
            current: String::new(),
            resolved_text: Some("Composants Serveur".into()),
            elapsed_ms: 0,
        };
        let line = outcome_line("a.md", &outcome);
        assert!(line.contains("Server Components → Composants Serveur"));
    }
}
