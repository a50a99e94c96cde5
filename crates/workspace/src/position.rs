// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Buffer positions
//!
//! Position, range and change records shared by every editor-facing request.
//! All lines and columns are 1-based.

use std::cmp::Ordering;
use std::fmt;

/// A 1-based (line, column) address into a script buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferPosition {
    /// Line number (1-based)
    pub line: usize,

    /// Column number (1-based, counted in characters)
    pub column: usize,
}

impl BufferPosition {
    /// Create a new buffer position
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Position that is not inside any buffer
    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    /// True if this position comes strictly before `other`
    pub fn is_before(&self, other: &BufferPosition) -> bool {
        self < other
    }

    /// True if this position comes strictly after `other`
    pub fn is_after(&self, other: &BufferPosition) -> bool {
        self > other
    }
}

impl PartialOrd for BufferPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BufferPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line
            .cmp(&other.line)
            .then_with(|| self.column.cmp(&other.column))
    }
}

impl fmt::Display for BufferPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A start/end pair of buffer positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRange {
    /// Range start (inclusive)
    pub start: BufferPosition,

    /// Range end (exclusive)
    pub end: BufferPosition,
}

impl BufferRange {
    /// Create a new range
    pub const fn new(start: BufferPosition, end: BufferPosition) -> Self {
        Self { start, end }
    }

    /// Create a range from raw line/column numbers
    pub const fn from_coords(
        start_line: usize,
        start_column: usize,
        end_line: usize,
        end_column: usize,
    ) -> Self {
        Self::new(
            BufferPosition::new(start_line, start_column),
            BufferPosition::new(end_line, end_column),
        )
    }

    /// Range that covers nothing
    pub const fn none() -> Self {
        Self::new(BufferPosition::none(), BufferPosition::none())
    }

    /// A range collapsed onto a single position
    pub const fn point(position: BufferPosition) -> Self {
        Self::new(position, position)
    }

    /// True if the range spans at least one character
    pub fn has_range(&self) -> bool {
        self.start != self.end
    }

    /// True if `position` lies in `[start, end]`
    pub fn contains(&self, position: &BufferPosition) -> bool {
        self.start <= *position && *position <= self.end
    }
}

impl fmt::Display for BufferRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Unit a client counts columns in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PositionEncoding {
    /// UTF-16 code units, the LSP default
    #[default]
    Utf16,

    /// Unicode scalar values, the unit buffer columns use
    Utf32,
}

/// A single coherent edit against a script buffer
///
/// `line`/`offset` and `end_line`/`end_offset` are 1-based positions; the
/// span between them is replaced by `insert_string`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileChange {
    /// Start line (1-based)
    pub line: usize,

    /// Start column (1-based)
    pub offset: usize,

    /// End line (1-based)
    pub end_line: usize,

    /// End column (1-based)
    pub end_offset: usize,

    /// Replacement text, may contain `\n` or `\r\n`
    pub insert_string: String,
}

impl FileChange {
    /// Replace the span `[start, end)` with `text`
    pub fn replace(start: BufferPosition, end: BufferPosition, text: impl Into<String>) -> Self {
        Self {
            line: start.line,
            offset: start.column,
            end_line: end.line,
            end_offset: end.column,
            insert_string: text.into(),
        }
    }

    /// Insert `text` at `position`
    pub fn insert(position: BufferPosition, text: impl Into<String>) -> Self {
        Self::replace(position, position, text)
    }

    /// Delete the span `[start, end)`
    pub fn delete(start: BufferPosition, end: BufferPosition) -> Self {
        Self::replace(start, end, String::new())
    }

    /// Start of the edited span
    pub fn start(&self) -> BufferPosition {
        BufferPosition::new(self.line, self.offset)
    }

    /// End of the edited span
    pub fn end(&self) -> BufferPosition {
        BufferPosition::new(self.end_line, self.end_offset)
    }
}
