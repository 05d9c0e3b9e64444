//! Applying resolutions to a parsed document.
//!
//! [`ConflictResolver`] turns a [`ParsedDocument`] plus one [`Resolution`]
//! per conflict block back into file content. Text outside blocks is copied
//! verbatim; unresolved blocks keep their markers.

use tracing::debug;

use super::parser::{strip_line_breaks, ConflictBlock, IncomingSide, ParsedDocument, Segment};
use crate::errors::ResolveError;

/// How a single conflict block is settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the existing translation.
    KeepCurrent,
    /// Take the incoming text verbatim (nothing to translate).
    AcceptIncoming,
    /// Replace the block with new text (a fresh translation).
    Replace(String),
    /// Leave the block and its markers for manual review.
    Unresolved,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }
}

/// Stateless rendering of resolved documents.
pub struct ConflictResolver;

impl ConflictResolver {
    /// Text that replaces `block` for `resolution`, or `None` to keep the
    /// block as-is.
    pub fn resolved_content(
        block: &ConflictBlock,
        resolution: &Resolution,
        side: IncomingSide,
    ) -> Option<String> {
        match resolution {
            Resolution::KeepCurrent => Some(block.current_region(side).to_string()),
            Resolution::AcceptIncoming => Some(block.incoming_region(side).to_string()),
            Resolution::Replace(text) => Some(fit_replacement(block, text, side)),
            Resolution::Unresolved => None,
        }
    }

    /// Render `doc` with one resolution per conflict block, in block order.
    pub fn render(
        doc: &ParsedDocument,
        resolutions: &[Resolution],
        side: IncomingSide,
    ) -> Result<String, ResolveError> {
        let expected = doc.conflict_count();
        if resolutions.len() != expected {
            return Err(ResolveError::ResolutionCountMismatch {
                expected,
                actual: resolutions.len(),
            });
        }

        let mut out = String::new();
        for segment in &doc.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Conflict(block) => {
                    let resolution = &resolutions[block.index];
                    match Self::resolved_content(block, resolution, side) {
                        Some(content) => {
                            debug!(index = block.index, "block resolved");
                            out.push_str(&content);
                        }
                        None => out.push_str(&block.raw),
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Give a replacement the line structure of the region it stands in for:
/// same line-ending style and the same trailing line break.
fn fit_replacement(block: &ConflictBlock, text: &str, side: IncomingSide) -> String {
    let region = block.incoming_region(side);
    let eol = if block.uses_crlf() { "\r\n" } else { "\n" };
    let body = strip_line_breaks(text).replace("\r\n", "\n").replace('\n', eol);
    // An empty region occupies no lines, but non-empty text must still end
    // its own line before the text that follows the block.
    if region.ends_with('\n') || (region.is_empty() && !body.is_empty()) {
        format!("{}{}", body, eol)
    } else {
        body
    }
}
