// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # SQL Tools Service - Workspace
//!
//! Editor-facing text model for the SQL tools language service.
//!
//! - [`ScriptFile`]: one buffer as logical lines, with 1-based position,
//!   0-based offset and range arithmetic plus incremental edits
//! - [`Workspace`]: the set of buffers the client has open
//! - [`BufferPosition`], [`BufferRange`], [`FileChange`]: position records
//!   shared by every request

pub mod error;
pub mod position;
pub mod script_file;
pub mod workspace;

// Re-exports
pub use error::{ScriptFileError, ScriptFileResult, WorkspaceError};
pub use position::{BufferPosition, BufferRange, FileChange, PositionEncoding};
pub use script_file::{FilePosition, LINE_SEPARATOR, ScriptFile, is_word_char};
pub use workspace::{ContentChange, Workspace, is_in_memory_uri, resolve_file_path};
