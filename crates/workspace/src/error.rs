// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Error types for the buffer model and workspace

use thiserror::Error;

use crate::position::BufferPosition;

/// Result type alias for script buffer operations
pub type ScriptFileResult<T> = Result<T, ScriptFileError>;

/// Position or range violations raised by [`crate::ScriptFile`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptFileError {
    /// Line is outside of the buffer
    #[error("Position {line}:{column} is outside of the line range of 1 to {max_line}")]
    LineOutOfRange {
        line: usize,
        column: usize,
        max_line: usize,
    },

    /// Column is outside of its line
    #[error("Position {line}:{column} is outside of the column range of 1 to {max_column}")]
    ColumnOutOfRange {
        line: usize,
        column: usize,
        max_column: usize,
    },

    /// Character offset is past the end of the buffer
    #[error("Offset {offset} is outside of the offset range of 0 to {max_offset}")]
    OffsetOutOfRange { offset: usize, max_offset: usize },

    /// Start offset comes after end offset
    #[error("Start offset {start} is after end offset {end}")]
    InvertedOffsets { start: usize, end: usize },

    /// Range start comes after range end
    #[error("Range start {start} is after range end {end}")]
    InvertedRange {
        start: BufferPosition,
        end: BufferPosition,
    },
}

impl ScriptFileError {
    /// True when the error names a position or offset outside the buffer
    pub fn is_out_of_range(&self) -> bool {
        matches!(
            self,
            ScriptFileError::LineOutOfRange { .. }
                | ScriptFileError::ColumnOutOfRange { .. }
                | ScriptFileError::OffsetOutOfRange { .. }
        )
    }
}

/// Workspace-level errors
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// No open buffer and nothing on disk for this URI
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Reading the backing file failed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Edit or query rejected by the buffer
    #[error(transparent)]
    ScriptFile(#[from] ScriptFileError),
}
