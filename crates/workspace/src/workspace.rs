// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Workspace
//!
//! Thread-safe store of the script buffers the client has open.
//!
//! Buffers are keyed by client URI, compared case-insensitively. Writers are
//! serialized behind a `tokio::sync::RwLock`, which is what the single-writer
//! assumption of [`ScriptFile`] relies on.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqltools_workspace::{ContentChange, Workspace};
//!
//! let workspace = Workspace::new();
//! workspace.open_file("untitled:Query1", "SELECT 1").await;
//! workspace
//!     .apply_changes("untitled:Query1", [ContentChange::Full("SELECT 2".into())])
//!     .await?;
//! ```

use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::WorkspaceError;
use crate::position::{FileChange, PositionEncoding};
use crate::script_file::ScriptFile;

/// One content change reported by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentChange {
    /// Edit a span of the buffer
    Incremental(FileChange),

    /// Replace the whole buffer
    Full(String),
}

/// Store of open script buffers
#[derive(Debug, Default)]
pub struct Workspace {
    /// Map of lower-cased client URI to buffer
    files: RwLock<HashMap<String, ScriptFile>>,
}

impl Workspace {
    /// Create an empty workspace
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a buffer with the given text
    ///
    /// An already open buffer keeps its identity and takes the new text.
    pub async fn open_file(&self, client_uri: &str, text: &str) {
        let mut files = self.files.write().await;
        match files.get_mut(&file_key(client_uri)) {
            Some(file) => {
                debug!(uri = client_uri, "reopening script buffer");
                file.set_file_contents(text);
            }
            None => {
                info!(uri = client_uri, "opening script buffer");
                let file = ScriptFile::new(resolve_file_path(client_uri), client_uri, text);
                files.insert(file_key(client_uri), file);
            }
        }
    }

    /// Return the open buffer, creating it from `initial_text` if absent
    pub async fn get_file_buffer(&self, client_uri: &str, initial_text: &str) -> ScriptFile {
        let mut files = self.files.write().await;
        files
            .entry(file_key(client_uri))
            .or_insert_with(|| {
                ScriptFile::new(resolve_file_path(client_uri), client_uri, initial_text)
            })
            .clone()
    }

    /// Return the buffer for `client_uri`, loading it from disk if needed
    ///
    /// # Errors
    ///
    /// - `FileNotFound` for an unknown in-memory URI or a missing file
    /// - `Io` when reading the file fails
    pub async fn get_file(&self, client_uri: &str) -> Result<ScriptFile, WorkspaceError> {
        if let Some(file) = self.files.read().await.get(&file_key(client_uri)) {
            return Ok(file.clone());
        }

        if is_in_memory_uri(client_uri) {
            return Err(WorkspaceError::FileNotFound(client_uri.to_string()));
        }

        let path = resolve_file_path(client_uri);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkspaceError::FileNotFound(client_uri.to_string()));
            }
            Err(source) => return Err(WorkspaceError::Io { path, source }),
        };

        debug!(uri = client_uri, path = %path, "loaded script buffer from disk");
        let file = ScriptFile::new(path, client_uri, &text);

        let mut files = self.files.write().await;
        Ok(files
            .entry(file_key(client_uri))
            .or_insert(file)
            .clone())
    }

    /// Run `f` against an open buffer without cloning it
    pub async fn with_file<T>(
        &self,
        client_uri: &str,
        f: impl FnOnce(&ScriptFile) -> T,
    ) -> Result<T, WorkspaceError> {
        let files = self.files.read().await;
        let file = files
            .get(&file_key(client_uri))
            .ok_or_else(|| WorkspaceError::FileNotFound(client_uri.to_string()))?;
        Ok(f(file))
    }

    /// Apply client changes to an open buffer, in order
    ///
    /// Stops at the first rejected change; changes before it stay applied.
    pub async fn apply_changes(
        &self,
        client_uri: &str,
        changes: impl IntoIterator<Item = ContentChange>,
    ) -> Result<(), WorkspaceError> {
        self.apply_encoded_changes(client_uri, changes, PositionEncoding::Utf32)
            .await
    }

    /// Apply changes whose columns are counted in `encoding` units
    ///
    /// Each change is converted against the text left by the one before it.
    pub async fn apply_encoded_changes(
        &self,
        client_uri: &str,
        changes: impl IntoIterator<Item = ContentChange>,
        encoding: PositionEncoding,
    ) -> Result<(), WorkspaceError> {
        let mut files = self.files.write().await;
        let file = files
            .get_mut(&file_key(client_uri))
            .ok_or_else(|| WorkspaceError::FileNotFound(client_uri.to_string()))?;

        for change in changes {
            match change {
                ContentChange::Incremental(change) => {
                    let change = file.decode_change(&change, encoding);
                    if let Err(err) = file.apply_change(&change) {
                        warn!(uri = client_uri, error = %err, "rejected buffer change");
                        return Err(err.into());
                    }
                }
                ContentChange::Full(text) => file.set_file_contents(&text),
            }
        }

        Ok(())
    }

    /// Turn hover and completion on or off for an open buffer
    pub async fn set_analysis_enabled(
        &self,
        client_uri: &str,
        enabled: bool,
    ) -> Result<(), WorkspaceError> {
        let mut files = self.files.write().await;
        let file = files
            .get_mut(&file_key(client_uri))
            .ok_or_else(|| WorkspaceError::FileNotFound(client_uri.to_string()))?;
        file.set_analysis_enabled(enabled);
        debug!(uri = client_uri, enabled, "analysis toggled");
        Ok(())
    }

    /// Check if a buffer is open
    pub async fn contains_file(&self, client_uri: &str) -> bool {
        self.files.read().await.contains_key(&file_key(client_uri))
    }

    /// Discard a buffer
    ///
    /// Returns true if the buffer was open.
    pub async fn close_file(&self, client_uri: &str) -> bool {
        let removed = self
            .files
            .write()
            .await
            .remove(&file_key(client_uri))
            .is_some();
        if removed {
            info!(uri = client_uri, "closed script buffer");
        }
        removed
    }

    /// Client URIs of every open buffer
    pub async fn opened_files(&self) -> Vec<String> {
        self.files
            .read()
            .await
            .values()
            .map(|file| file.client_uri().to_string())
            .collect()
    }

    pub async fn file_count(&self) -> usize {
        self.files.read().await.len()
    }
}

/// True when `uri` names a buffer with no file behind it
///
/// Plain paths and `file:` URIs are on disk; every other scheme (`untitled`,
/// `inmemory`, `tsqloutput`, `git`, ...) is an in-memory buffer.
pub fn is_in_memory_uri(uri: &str) -> bool {
    parse_uri(uri).is_some_and(|url| url.scheme() != "file")
}

/// Map a client URI to a local path; non-file URIs are returned unchanged
///
/// A `file:` URI with a host names a UNC share and keeps it as `//host/...`
/// where the platform can't express it as a path.
pub fn resolve_file_path(uri: &str) -> String {
    let Some(url) = parse_uri(uri).filter(|url| url.scheme() == "file") else {
        return uri.to_string();
    };

    if let Ok(path) = url.to_file_path() {
        return path.to_string_lossy().into_owned();
    }

    let decoded = percent_decode_str(url.path()).decode_utf8_lossy();
    match url.host_str() {
        Some(host) => format!("//{host}{decoded}"),
        None => decoded.into_owned(),
    }
}

fn file_key(uri: &str) -> String {
    uri.to_lowercase()
}

fn parse_uri(uri: &str) -> Option<Url> {
    let url = Url::parse(uri).ok()?;
    // Single letters are Windows drive prefixes
    (url.scheme().len() > 1).then_some(url)
}
