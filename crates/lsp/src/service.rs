// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Language service
//!
//! Request pipeline behind the LSP handlers. Positions come in counted in the
//! negotiated [`PositionEncoding`], text is read from the [`Workspace`], and
//! the lookup runs as a binding operation on the document's connection
//! context. Buffers with analysis turned off get no hover or completion.
//!
//! ```text
//! hover(uri, pos) → Workspace: identifier at pos
//!                 → ConnectedBindingQueue: binder.resolve(identifier)
//!                 → markdown, or nothing on timeout
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use sqltools_catalog::{
    BoundSymbol, CatalogResult, ConnectionFactory, StaticConnectionFactory, StaticMetadataProvider,
};
use sqltools_workspace::{
    BufferPosition, BufferRange, ContentChange, PositionEncoding, ScriptFile, ScriptFileResult,
    Workspace, WorkspaceError, is_word_char,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::binding_queue::BindingRequest;
use crate::config::ServiceConfig;
use crate::connected_binding_queue::{ConnectedBindingContext, ConnectedBindingQueue};

/// Feature name reported when opening connections for hover and completion
pub const INTELLISENSE_FEATURE: &str = "IntelliSense";

/// Hover text and the span it describes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverInfo {
    pub contents: String,
    pub range: BufferRange,
}

/// What the editor typed before the cursor
#[derive(Debug, Clone, PartialEq, Eq)]
struct CompletionPrefix {
    qualifier: Option<String>,
    prefix: String,
}

/// Workspace and binding queue behind one language server
pub struct LanguageService {
    workspace: Workspace,
    queue: ConnectedBindingQueue,
    config: RwLock<ServiceConfig>,
    position_encoding: RwLock<PositionEncoding>,
    /// Lower-cased document URI to binding context key
    document_keys: RwLock<HashMap<String, String>>,
}

impl LanguageService {
    /// Must be called inside a tokio runtime
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: ServiceConfig) -> Self {
        Self {
            workspace: Workspace::new(),
            queue: ConnectedBindingQueue::with_settings(factory, config.queue_settings()),
            config: RwLock::new(config),
            position_encoding: RwLock::new(PositionEncoding::default()),
            document_keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn binding_queue(&self) -> &ConnectedBindingQueue {
        &self.queue
    }

    pub async fn config(&self) -> ServiceConfig {
        self.config.read().await.clone()
    }

    /// Unit the client counts columns in; UTF-16 until negotiated
    pub async fn position_encoding(&self) -> PositionEncoding {
        *self.position_encoding.read().await
    }

    pub async fn set_position_encoding(&self, encoding: PositionEncoding) {
        debug!(?encoding, "position encoding set");
        *self.position_encoding.write().await = encoding;
    }

    /// Replace the configuration
    ///
    /// A new schema file replaces the connection factory and drops every
    /// context. Open documents are rebound when the connection or the
    /// factory changed. Queue-wide default timeouts keep their startup
    /// values; per-request timeouts use the new ones.
    ///
    /// # Errors
    ///
    /// Returns the catalog error if the new schema file can't be loaded; the
    /// old configuration stays in effect.
    pub async fn update_config(&self, config: ServiceConfig) -> CatalogResult<()> {
        // Load a new schema before taking the write lock
        let factory = if self.config.read().await.metadata_path != config.metadata_path {
            Some(connection_factory_for(&config).await?)
        } else {
            None
        };

        let mut current = self.config.write().await;
        let new_factory = factory.is_some();
        if let Some(factory) = factory {
            self.queue.set_connection_factory(factory);
            self.queue.close_all().await;
        }

        let reconnect = new_factory
            || current.connection != config.connection
            || current.intellisense_enabled != config.intellisense_enabled;
        *current = config;
        drop(current);

        if reconnect {
            info!("connection settings changed, rebinding open documents");
            self.document_keys.write().await.clear();
            for uri in self.workspace.opened_files().await {
                self.connect_document(&uri).await;
            }
        }
        Ok(())
    }

    /// Open a document and bind it to the configured connection
    pub async fn open_document(&self, uri: &str, text: &str) -> Option<String> {
        self.workspace.open_file(uri, text).await;
        self.connect_document(uri).await
    }

    /// Bind a document to the configured connection
    ///
    /// A context that failed to connect earlier is reconnected. Returns the
    /// binding context key, or `None` when no connection is configured or
    /// IntelliSense is off.
    pub async fn connect_document(&self, uri: &str) -> Option<String> {
        let config = self.config.read().await.clone();
        if !config.intellisense_enabled {
            return None;
        }
        let info = config.connection_info(uri)?;

        let key = ConnectedBindingQueue::get_connection_context_key(&info.connection_details);
        let overwrite = !self.queue.is_binding_context_connected(&key).await;
        let key = self
            .queue
            .add_connection_context(Some(&info), true, INTELLISENSE_FEATURE, overwrite)
            .await;
        self.document_keys
            .write()
            .await
            .insert(uri.to_lowercase(), key.clone());
        Some(key)
    }

    pub async fn change_document(
        &self,
        uri: &str,
        changes: Vec<ContentChange>,
    ) -> Result<(), WorkspaceError> {
        let encoding = self.position_encoding().await;
        self.workspace
            .apply_encoded_changes(uri, changes, encoding)
            .await
    }

    /// Close a document; its connection context stays for other documents
    pub async fn close_document(&self, uri: &str) -> bool {
        self.document_keys.write().await.remove(&uri.to_lowercase());
        self.workspace.close_file(uri).await
    }

    /// Binding context key of a document
    pub async fn document_key(&self, uri: &str) -> Option<String> {
        self.document_keys
            .read()
            .await
            .get(&uri.to_lowercase())
            .cloned()
    }

    /// Describe the identifier at `position`
    ///
    /// Returns `Ok(None)` when there is no identifier, no connection, no
    /// match, or the lookup timed out. The range is in the same encoding as
    /// `position`.
    pub async fn hover(
        &self,
        uri: &str,
        position: BufferPosition,
    ) -> Result<Option<HoverInfo>, WorkspaceError> {
        let encoding = self.position_encoding().await;
        let target = self
            .workspace
            .with_file(uri, |file| -> ScriptFileResult<Option<(String, BufferRange)>> {
                if !file.is_analysis_enabled() {
                    return Ok(None);
                }
                let target = qualified_word_at(file, file.decode_position(position, encoding))?;
                Ok(target.map(|(identifier, range)| (identifier, file.encode_range(range, encoding))))
            })
            .await??;
        let Some((identifier, range)) = target else {
            return Ok(None);
        };
        let Some(key) = self.document_key(uri).await else {
            return Ok(None);
        };

        let config = self.config().await;
        let request = BindingRequest::new(
            key,
            move |context: &ConnectedBindingContext, token: &CancellationToken| {
                let Some(binder) = context.binder() else {
                    return Ok(None);
                };
                if token.is_cancelled() {
                    return Ok(None);
                }
                Ok(binder.resolve(&identifier)?.map(|symbol| symbol.describe()))
            },
        )
        .with_timeout_operation(|_| None)
        .with_error_handler(|_| None)
        .with_binding_timeout(config.hover_timeout())
        .with_lock_timeout(config.queue_settings().wait_for_lock_timeout);

        let Some(handle) = self.queue.queue_binding_operation(request) else {
            return Ok(None);
        };

        match handle.wait().await {
            Ok(contents) => Ok(contents.map(|contents| HoverInfo { contents, range })),
            Err(err) => {
                debug!(uri, error = %err, "hover lookup produced no result");
                Ok(None)
            }
        }
    }

    /// Tables and columns matching what was typed before `position`
    ///
    /// After `table.` only that table's columns are offered.
    pub async fn completion(
        &self,
        uri: &str,
        position: BufferPosition,
    ) -> Result<Vec<BoundSymbol>, WorkspaceError> {
        let encoding = self.position_encoding().await;
        let typed = self
            .workspace
            .with_file(uri, |file| {
                if !file.is_analysis_enabled() {
                    return Ok(None);
                }
                completion_prefix(file, file.decode_position(position, encoding)).map(Some)
            })
            .await??;
        let Some(typed) = typed else {
            return Ok(Vec::new());
        };
        let Some(key) = self.document_key(uri).await else {
            return Ok(Vec::new());
        };

        let config = self.config().await;
        let request = BindingRequest::new(
            key,
            move |context: &ConnectedBindingContext, token: &CancellationToken| {
                let Some(binder) = context.binder() else {
                    return Ok(Vec::new());
                };
                if token.is_cancelled() {
                    return Ok(Vec::new());
                }

                let Some(qualifier) = typed.qualifier else {
                    return Ok(binder.completions(&typed.prefix)?);
                };
                let Some(BoundSymbol::Table(table)) = binder.resolve(&qualifier)? else {
                    return Ok(Vec::new());
                };
                let prefix = typed.prefix.to_lowercase();
                Ok(table
                    .columns
                    .iter()
                    .filter(|column| column.name.to_lowercase().starts_with(&prefix))
                    .map(|column| BoundSymbol::Column {
                        table: table.name.clone(),
                        column: column.clone(),
                    })
                    .collect())
            },
        )
        .with_timeout_operation(|_| Vec::new())
        .with_error_handler(|_| Vec::new())
        .with_binding_timeout(config.completion_timeout())
        .with_lock_timeout(config.queue_settings().wait_for_lock_timeout);

        let Some(handle) = self.queue.queue_binding_operation(request) else {
            return Ok(Vec::new());
        };

        match handle.wait().await {
            Ok(symbols) => Ok(symbols),
            Err(err) => {
                debug!(uri, error = %err, "completion lookup produced no result");
                Ok(Vec::new())
            }
        }
    }

    /// Disconnect contexts idle longer than the configured limit
    pub async fn prune_idle_contexts(&self) -> Vec<String> {
        let Some(max_idle) = self.config.read().await.idle_context_timeout() else {
            return Vec::new();
        };
        let pruned = self.queue.prune_idle_contexts(max_idle).await;
        if !pruned.is_empty() {
            self.document_keys
                .write()
                .await
                .retain(|_, key| !pruned.contains(key));
        }
        pruned
    }

    /// Stop the binding queue and close every connection
    pub async fn shutdown(&self) {
        let timeout = self.config.read().await.queue_settings().wait_for_lock_timeout;
        self.queue.shutdown(timeout).await;
        self.document_keys.write().await.clear();
    }
}

impl std::fmt::Debug for LanguageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageService")
            .field("workspace", &self.workspace)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

/// Connection factory for a configuration
///
/// Connections serve the schema file named by `metadata_path`, or the
/// playground schema when none is set.
pub async fn connection_factory_for(
    config: &ServiceConfig,
) -> CatalogResult<Arc<dyn ConnectionFactory>> {
    let provider = match &config.metadata_path {
        Some(path) => StaticMetadataProvider::from_file(path).await?,
        None => StaticMetadataProvider::playground(),
    };
    Ok(Arc::new(StaticConnectionFactory::new(provider)))
}

/// Identifier at `position`, extended left over `qualifier.` parts
fn qualified_word_at(
    file: &ScriptFile,
    position: BufferPosition,
) -> ScriptFileResult<Option<(String, BufferRange)>> {
    let Some(mut range) = file.word_range_at(position)? else {
        return Ok(None);
    };

    let line: Vec<char> = file.get_line(position.line)?.chars().collect();
    while range.start.column >= 3 && line[range.start.column - 2] == '.' {
        let dot = BufferPosition::new(range.start.line, range.start.column - 1);
        match file.word_range_at(dot)? {
            Some(qualifier) => range.start = qualifier.start,
            None => break,
        }
    }

    Ok(Some((file.get_text_in_range(&range)?, range)))
}

fn completion_prefix(
    file: &ScriptFile,
    position: BufferPosition,
) -> ScriptFileResult<CompletionPrefix> {
    file.validate_position(position.line, position.column)?;
    let line: Vec<char> = file.get_line(position.line)?.chars().collect();

    let cursor = position.column - 1;
    let start = word_start(&line, cursor);
    let prefix = line[start..cursor].iter().collect();

    let qualifier = (start > 0 && line[start - 1] == '.')
        .then(|| {
            let dot = start - 1;
            line[word_start(&line, dot)..dot].iter().collect::<String>()
        })
        .filter(|qualifier| !qualifier.is_empty());

    Ok(CompletionPrefix { qualifier, prefix })
}

fn word_start(chars: &[char], end: usize) -> usize {
    let mut start = end;
    while start > 0 && is_word_char(chars[start - 1]) {
        start -= 1;
    }
    start
}
