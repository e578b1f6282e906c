// SPDX-License-Identifier: AGPL-3.0

//! Source positions.
//!
//! Lines are 1-based and columns 0-based byte offsets within the line, for every table
//! built by [`LineIndex`]. Compiler offsets are byte offsets, so columns are bytes too.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A start/end pair inside one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub start: Position,
    pub end: Position,
}

impl Location {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// True when `inner` lies within this location, bounds included
    pub fn contains(&self, inner: &Location) -> bool {
        self.start <= inner.start && inner.end <= self.end
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

/// A location together with the file it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRange {
    pub file_index: usize,
    pub file: Arc<str>,
    pub location: Location,
}

impl SourceRange {
    pub fn start(&self) -> Position {
        self.location.start
    }

    pub fn end(&self) -> Position {
        self.location.end
    }
}

/// Byte offset → line/column table for one source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            line_starts,
            len: text.len(),
        }
    }

    /// Position of a byte offset; the offset one past the end of the text is valid.
    pub fn position(&self, offset: usize) -> Option<Position> {
        if offset > self.len {
            return None;
        }
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        Some(Position {
            line: line + 1,
            column: offset - self.line_starts[line],
        })
    }

    /// Location of the byte range `[offset, offset + length]`
    pub fn location(&self, offset: usize, length: usize) -> Option<Location> {
        let end = offset.checked_add(length)?;
        Some(Location {
            start: self.position(offset)?,
            end: self.position(end)?,
        })
    }

    /// Byte offset of a position, the inverse of [`LineIndex::position`]
    pub fn offset(&self, position: Position) -> Option<usize> {
        let start = *self.line_starts.get(position.line.checked_sub(1)?)?;
        let offset = start + position.column;
        (offset <= self.len).then_some(offset)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn text_len(&self) -> usize {
        self.len
    }
}
