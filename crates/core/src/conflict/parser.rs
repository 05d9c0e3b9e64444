//! Conflict-marker parsing.
//!
//! A single linear pass splits a file into plain-text segments and conflict
//! blocks. Every byte of the input ends up in exactly one segment, so a
//! document rendered without resolutions is identical to its source.

use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which side of a conflict carries the incoming (English) text.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IncomingSide {
    /// `git merge upstream`: incoming text follows `=======`.
    #[default]
    Theirs,
    /// `git rebase upstream`: incoming text precedes `=======`.
    Ours,
}

/// A single `<<<<<<<` ... `>>>>>>>` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictBlock {
    /// Ordinal position within the file (0-based).
    pub index: usize,
    /// Line number (1-based) of the `<<<<<<<` marker.
    pub start_line: usize,
    /// Line number (1-based) of the `>>>>>>>` marker.
    pub end_line: usize,
    /// Label after `<<<<<<<` (usually `HEAD`).
    pub ours_label: String,
    /// Label after `>>>>>>>` (usually the merged branch).
    pub theirs_label: String,
    /// Lines between `<<<<<<<` and the base or `=======` marker.
    pub ours: String,
    /// diff3 base section, when present.
    pub base: Option<String>,
    /// Lines between `=======` and `>>>>>>>`.
    pub theirs: String,
    /// The whole block, markers included, exactly as in the source.
    pub raw: String,
}

impl ConflictBlock {
    /// The region holding the incoming (English) text, line endings included.
    pub fn incoming_region(&self, side: IncomingSide) -> &str {
        match side {
            IncomingSide::Theirs => &self.theirs,
            IncomingSide::Ours => &self.ours,
        }
    }

    /// The region holding the current (translated) text.
    pub fn current_region(&self, side: IncomingSide) -> &str {
        match side {
            IncomingSide::Theirs => &self.ours,
            IncomingSide::Ours => &self.theirs,
        }
    }

    /// Incoming text without its trailing line break.
    pub fn incoming_text(&self, side: IncomingSide) -> &str {
        strip_line_breaks(self.incoming_region(side))
    }

    /// Current text without its trailing line break.
    pub fn current_text(&self, side: IncomingSide) -> &str {
        strip_line_breaks(self.current_region(side))
    }

    /// Whether the block uses CRLF line endings.
    pub fn uses_crlf(&self) -> bool {
        self.raw.contains("\r\n")
    }
}

/// Trailing `\n` / `\r` characters removed.
pub fn strip_line_breaks(text: &str) -> &str {
    text.trim_end_matches(['\n', '\r'])
}

/// A run of the parsed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Conflict(ConflictBlock),
}

/// A problem found while parsing; the affected lines are kept as plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    /// 1-based line number the problem was detected at.
    pub line: usize,
    pub message: String,
}

/// A file split into text and conflict segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    pub segments: Vec<Segment>,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedDocument {
    pub fn conflicts(&self) -> impl Iterator<Item = &ConflictBlock> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Conflict(block) => Some(block),
            Segment::Text(_) => None,
        })
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts().count()
    }

    pub fn has_conflicts(&self) -> bool {
        self.conflicts().next().is_some()
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Start,
    Base,
    Separator,
    End,
}

/// Recognise a marker line: seven marker characters followed by whitespace
/// or the end of the line. Returns the kind and the trimmed label.
fn marker(line: &str) -> Option<(MarkerKind, &str)> {
    let line = strip_line_breaks(line);
    let kind = match line.as_bytes().first()? {
        b'<' => MarkerKind::Start,
        b'|' => MarkerKind::Base,
        b'=' => MarkerKind::Separator,
        b'>' => MarkerKind::End,
        _ => return None,
    };
    let ch = line.as_bytes()[0];
    if line.len() < 7 || !line.as_bytes()[..7].iter().all(|b| *b == ch) {
        return None;
    }
    let rest = &line[7..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((kind, rest.trim()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    Ours,
    Base,
    Theirs,
}

#[derive(Default)]
struct OpenBlock {
    start_line: usize,
    ours_label: String,
    ours: String,
    base: Option<String>,
    theirs: String,
    raw: String,
}

/// Quick pre-filter: can `content` contain a conflict block at all?
pub fn has_conflict_markers(content: &str) -> bool {
    content.contains("<<<<<<<") && content.contains(">>>>>>>")
}

/// Stateless conflict-marker parser.
pub struct ConflictParser;

impl ConflictParser {
    /// Split `content` into text and conflict segments.
    pub fn parse(content: &str) -> ParsedDocument {
        let mut doc = ParsedDocument::default();
        let mut text = String::new();
        let mut open = OpenBlock::default();
        let mut state = State::Text;
        let mut index = 0usize;

        for (i, line) in content.split_inclusive('\n').enumerate() {
            let line_no = i + 1;
            let found = if state == State::Text {
                // Only a start marker means anything outside a block.
                marker(line).filter(|(k, _)| *k == MarkerKind::Start)
            } else {
                marker(line)
            };

            match (state, found) {
                (State::Text, Some((_, label))) => {
                    open = OpenBlock {
                        start_line: line_no,
                        ours_label: label.to_string(),
                        raw: line.to_string(),
                        ..OpenBlock::default()
                    };
                    state = State::Ours;
                }
                (State::Text, None) => text.push_str(line),

                (_, Some((MarkerKind::Start, label))) => {
                    doc.warnings.push(ParseWarning {
                        line: line_no,
                        message: format!(
                            "conflict opened at line {} was not closed before a new one",
                            open.start_line
                        ),
                    });
                    text.push_str(&open.raw);
                    open = OpenBlock {
                        start_line: line_no,
                        ours_label: label.to_string(),
                        raw: line.to_string(),
                        ..OpenBlock::default()
                    };
                    state = State::Ours;
                }

                (State::Ours, Some((MarkerKind::Base, _))) => {
                    open.raw.push_str(line);
                    open.base = Some(String::new());
                    state = State::Base;
                }
                (State::Ours | State::Base, Some((MarkerKind::Separator, _))) => {
                    open.raw.push_str(line);
                    state = State::Theirs;
                }
                (State::Ours | State::Base, Some((MarkerKind::End, _))) => {
                    doc.warnings.push(ParseWarning {
                        line: line_no,
                        message: format!(
                            "conflict opened at line {} has no ======= separator",
                            open.start_line
                        ),
                    });
                    text.push_str(&open.raw);
                    text.push_str(line);
                    open = OpenBlock::default();
                    state = State::Text;
                }

                (State::Theirs, Some((MarkerKind::End, label))) => {
                    open.raw.push_str(line);
                    if !text.is_empty() {
                        doc.segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    let block = std::mem::take(&mut open);
                    debug!(index, start = block.start_line, end = line_no, "conflict block");
                    doc.segments.push(Segment::Conflict(ConflictBlock {
                        index,
                        start_line: block.start_line,
                        end_line: line_no,
                        ours_label: block.ours_label,
                        theirs_label: label.to_string(),
                        ours: block.ours,
                        base: block.base,
                        theirs: block.theirs,
                        raw: block.raw,
                    }));
                    index += 1;
                    state = State::Text;
                }

                (State::Ours, _) => {
                    open.raw.push_str(line);
                    open.ours.push_str(line);
                }
                (State::Base, _) => {
                    open.raw.push_str(line);
                    if let Some(base) = open.base.as_mut() {
                        base.push_str(line);
                    }
                }
                (State::Theirs, _) => {
                    open.raw.push_str(line);
                    open.theirs.push_str(line);
                }
            }
        }

        if state != State::Text {
            doc.warnings.push(ParseWarning {
                line: open.start_line,
                message: format!(
                    "conflict opened at line {} is not terminated",
                    open.start_line
                ),
            });
            text.push_str(&open.raw);
        }
        if !text.is_empty() {
            doc.segments.push(Segment::Text(text));
        }
        doc
    }
}
