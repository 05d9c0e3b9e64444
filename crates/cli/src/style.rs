//! Shared styling utilities for terminal output.

use console::Style;

use lingomerge_core::OutcomeKind;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold, white).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Fixed-width, colored label for a conflict outcome.
pub fn outcome(kind: OutcomeKind) -> String {
    let (symbol, style) = match kind {
        OutcomeKind::KeptExisting => ("=", Style::new().blue()),
        OutcomeKind::AcceptedIncoming => ("→", Style::new().cyan()),
        OutcomeKind::Translated => ("✓", Style::new().green()),
        OutcomeKind::Failed => ("✗", Style::new().red().bold()),
    };
    style
        .apply_to(format!("{} {:<10}", symbol, kind.label()))
        .to_string()
}

/// Color one line of a unified diff.
pub fn diff_line(line: &str) -> String {
    let style = if line.starts_with("+++") || line.starts_with("---") {
        Style::new().bold()
    } else if line.starts_with('+') {
        Style::new().green()
    } else if line.starts_with('-') {
        Style::new().red()
    } else if line.starts_with("@@") {
        Style::new().cyan()
    } else {
        Style::new()
    };
    style.apply_to(line).to_string()
}
