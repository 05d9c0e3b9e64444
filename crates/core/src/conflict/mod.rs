//! Conflict-block parsing and resolution.
//!
//! The conflict subsystem is responsible for:
//! 1. **Parsing** -- splitting a file into text and `<<<<<<<` blocks.
//! 2. **Resolution** -- rendering the file back with each block settled.

pub mod parser;
pub mod resolver;

pub use parser::{
    has_conflict_markers, ConflictBlock, ConflictParser, IncomingSide, ParseWarning,
    ParsedDocument, Segment,
};
pub use resolver::{ConflictResolver, Resolution};
