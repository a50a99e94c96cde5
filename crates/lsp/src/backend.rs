// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # LSP Backend Implementation
//!
//! This module provides the LSP server backend using tower-lsp.
//!
//! ## Overview
//!
//! The backend handles:
//! - LSP protocol communication via tower-lsp
//! - Document lifecycle (open, change, close)
//! - Service configuration from initialization options and settings changes
//! - Hover and completion through the [`LanguageService`]
//!
//! ## Architecture
//!
//! ```text
//! Client → LSP Backend → LanguageService → Workspace
//!                                        → ConnectedBindingQueue → MetadataBinder
//! ```
//!
//! ## Positions
//!
//! LSP positions are 0-based, buffer positions are 1-based. `character` is
//! counted in UTF-32 units when the client offers that encoding, otherwise in
//! UTF-16 units; the service converts it against the line text.

use std::sync::Arc;

use serde_json::Value;
use sqltools_catalog::{BoundSymbol, CatalogError};
use sqltools_workspace::{
    BufferPosition, BufferRange, ContentChange, FileChange, PositionEncoding, WorkspaceError,
};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{error, info, warn};

use crate::binding_queue::BindingError;
use crate::config::{ConfigError, ServiceConfig};
use crate::service::LanguageService;
use crate::{SERVER_NAME, VERSION};

/// LSP backend implementation
///
/// Main entry point for all LSP protocol operations.
pub struct LspBackend {
    /// LSP client for sending notifications and requests
    client: Client,

    /// Workspace, binding queue and configuration
    service: Arc<LanguageService>,
}

impl LspBackend {
    /// Create a new LSP backend
    ///
    /// # Arguments
    ///
    /// - `client`: LSP client handle
    /// - `service`: the language service requests are routed to
    pub fn new(client: Client, service: Arc<LanguageService>) -> Self {
        Self { client, service }
    }

    pub fn service(&self) -> &Arc<LanguageService> {
        &self.service
    }

    /// Apply a settings payload
    ///
    /// Returns false when the payload has no section for this server.
    async fn apply_settings(&self, settings: &Value) -> std::result::Result<bool, LspError> {
        let Some(config) = ServiceConfig::from_lsp_settings(settings)? else {
            return Ok(false);
        };
        info!(
            connected = config.connection.is_some(),
            intellisense = config.intellisense_enabled,
            "service configuration updated"
        );
        self.service.update_config(config).await?;
        Ok(true)
    }

    /// Log a message to the client
    async fn log_message(&self, message: &str, message_type: MessageType) {
        self.client.log_message(message_type, message).await;
    }

    /// Show a message to the user
    async fn show_message(&self, message: &str, message_type: MessageType) {
        self.client.show_message(message_type, message).await;
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for LspBackend {
    /// Initialize the LSP server
    ///
    /// Initialization options carry the same payload as
    /// `workspace/didChangeConfiguration`.
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        info!("Initializing LSP server");
        info!("Client info: {:?}", params.client_info);

        if let Some(options) = params.initialization_options.as_ref() {
            if let Err(e) = self.apply_settings(options).await {
                warn!("Ignoring initialization options: {}", e);
            }
        }

        let encoding = negotiate_position_encoding(&params.capabilities);
        info!("Position encoding: {:?}", encoding);
        self.service.set_position_encoding(encoding).await;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                position_encoding: Some(to_position_encoding_kind(encoding)),
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(vec![".".to_string()]),
                    work_done_progress_options: WorkDoneProgressOptions {
                        work_done_progress: Some(false),
                    },
                    all_commit_characters: None,
                    completion_item: None,
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: SERVER_NAME.to_string(),
                version: Some(VERSION.to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        info!("LSP server initialized successfully");
        self.log_message("SQL tools language service ready", MessageType::INFO)
            .await;
    }

    /// Stop the binding queue and close every connection
    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down LSP server");
        self.service.shutdown().await;
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        info!(
            "Document opened: uri={}, language={}, version={}",
            doc.uri, doc.language_id, doc.version
        );

        let Some(key) = self.service.open_document(doc.uri.as_str(), &doc.text).await else {
            return;
        };
        if !self
            .service
            .binding_queue()
            .is_binding_context_connected(&key)
            .await
        {
            warn!("Document {} is bound to disconnected context {}", doc.uri, key);
            self.log_message(
                &format!("Could not connect {} for IntelliSense", doc.uri),
                MessageType::WARNING,
            )
            .await;
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        info!(
            "Document changed: uri={}, version={}, changes={}",
            uri,
            params.text_document.version,
            params.content_changes.len()
        );

        let changes = params
            .content_changes
            .into_iter()
            .map(to_content_change)
            .collect();

        match self.service.change_document(uri.as_str(), changes).await {
            Ok(()) => {}
            Err(WorkspaceError::FileNotFound(uri)) => {
                warn!("Document not found for change: {}", uri);
            }
            Err(e) => {
                error!("Failed to update document: {}", e);
                self.show_message(
                    &format!("Failed to update document: {}", e),
                    MessageType::ERROR,
                )
                .await;
            }
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        info!("Document closed: uri={}", uri);

        if !self.service.close_document(uri.as_str()).await {
            warn!("Document not found for close: {}", uri);
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        match self.apply_settings(&params.settings).await {
            Ok(true) => {}
            Ok(false) => info!("Configuration change has no sqlTools section"),
            Err(e) => {
                error!("Invalid configuration: {}", e);
                self.show_message(&format!("Invalid configuration: {}", e), MessageType::ERROR)
                    .await;
            }
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        match self
            .service
            .hover(uri.as_str(), to_buffer_position(position))
            .await
        {
            Ok(Some(hover)) => Ok(Some(Hover {
                contents: HoverContents::Markup(MarkupContent {
                    kind: MarkupKind::Markdown,
                    value: hover.contents,
                }),
                range: Some(to_lsp_range(hover.range)),
            })),
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("Hover failed for {}: {}", uri, e);
                Ok(None)
            }
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let symbols = match self
            .service
            .completion(uri.as_str(), to_buffer_position(position))
            .await
        {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!("Completion failed for {}: {}", uri, e);
                return Ok(None);
            }
        };

        if symbols.is_empty() {
            return Ok(None);
        }
        info!("Completion returned {} items", symbols.len());
        Ok(Some(CompletionResponse::Array(
            symbols.iter().map(to_completion_item).collect(),
        )))
    }
}

/// UTF-32 when the client offers it, else the UTF-16 default
pub fn negotiate_position_encoding(capabilities: &ClientCapabilities) -> PositionEncoding {
    let offered = capabilities
        .general
        .as_ref()
        .and_then(|general| general.position_encodings.as_ref());
    match offered {
        Some(kinds) if kinds.contains(&PositionEncodingKind::UTF32) => PositionEncoding::Utf32,
        _ => PositionEncoding::Utf16,
    }
}

pub fn to_position_encoding_kind(encoding: PositionEncoding) -> PositionEncodingKind {
    match encoding {
        PositionEncoding::Utf16 => PositionEncodingKind::UTF16,
        PositionEncoding::Utf32 => PositionEncodingKind::UTF32,
    }
}

/// LSP position (0-based) to buffer position (1-based)
pub fn to_buffer_position(position: Position) -> BufferPosition {
    BufferPosition::new(position.line as usize + 1, position.character as usize + 1)
}

/// Buffer position (1-based) to LSP position (0-based)
pub fn to_lsp_position(position: BufferPosition) -> Position {
    Position::new(
        position.line.saturating_sub(1) as u32,
        position.column.saturating_sub(1) as u32,
    )
}

pub fn to_lsp_range(range: BufferRange) -> Range {
    Range::new(to_lsp_position(range.start), to_lsp_position(range.end))
}

/// A change without a range replaces the whole document
pub fn to_content_change(event: TextDocumentContentChangeEvent) -> ContentChange {
    match event.range {
        Some(range) => ContentChange::Incremental(FileChange::replace(
            to_buffer_position(range.start),
            to_buffer_position(range.end),
            event.text,
        )),
        None => ContentChange::Full(event.text),
    }
}

pub fn to_completion_item(symbol: &BoundSymbol) -> CompletionItem {
    let (kind, detail) = match symbol {
        BoundSymbol::Table(table) => (CompletionItemKind::STRUCT, table.qualified_name()),
        BoundSymbol::Column { table, column } => (
            CompletionItemKind::FIELD,
            format!("{}.{} {}", table, column.name, column.data_type),
        ),
    };

    CompletionItem {
        label: symbol.name().to_string(),
        kind: Some(kind),
        detail: Some(detail),
        documentation: Some(Documentation::MarkupContent(MarkupContent {
            kind: MarkupKind::Markdown,
            value: symbol.describe(),
        })),
        ..Default::default()
    }
}

/// LSP backend errors
///
/// Errors that can occur during LSP operations.
#[derive(Debug, thiserror::Error)]
pub enum LspError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Workspace error
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// Catalog error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Binding queue error
    #[error("Binding error: {0}")]
    Binding(#[from] BindingError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqltools_catalog::{ColumnMetadata, DataType, TableMetadata};

    #[test]
    fn test_position_conversion() {
        let position = to_buffer_position(Position::new(0, 0));
        assert_eq!(position, BufferPosition::new(1, 1));
        assert_eq!(to_lsp_position(BufferPosition::new(3, 7)), Position::new(2, 6));
    }

    #[test]
    fn test_position_encoding_negotiation() {
        let offering = |kinds: Vec<PositionEncodingKind>| ClientCapabilities {
            general: Some(GeneralClientCapabilities {
                position_encodings: Some(kinds),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(
            negotiate_position_encoding(&offering(vec![
                PositionEncodingKind::UTF8,
                PositionEncodingKind::UTF32,
            ])),
            PositionEncoding::Utf32
        );
        assert_eq!(
            negotiate_position_encoding(&offering(vec![PositionEncodingKind::UTF8])),
            PositionEncoding::Utf16
        );
        assert_eq!(
            negotiate_position_encoding(&ClientCapabilities::default()),
            PositionEncoding::Utf16
        );
        assert_eq!(
            to_position_encoding_kind(PositionEncoding::Utf32),
            PositionEncodingKind::UTF32
        );
    }

    #[test]
    fn test_content_change_conversion() {
        let incremental = to_content_change(TextDocumentContentChangeEvent {
            range: Some(Range::new(Position::new(0, 7), Position::new(0, 8))),
            range_length: None,
            text: "id".to_string(),
        });
        assert_eq!(
            incremental,
            ContentChange::Incremental(FileChange::replace(
                BufferPosition::new(1, 8),
                BufferPosition::new(1, 9),
                "id",
            ))
        );

        let full = to_content_change(TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "SELECT 1".to_string(),
        });
        assert_eq!(full, ContentChange::Full("SELECT 1".to_string()));
    }

    #[test]
    fn test_completion_item() {
        let symbol = BoundSymbol::Column {
            table: "users".to_string(),
            column: ColumnMetadata::new("email", DataType::NVarchar(Some(255))),
        };
        let item = to_completion_item(&symbol);
        assert_eq!(item.label, "email");
        assert_eq!(item.kind, Some(CompletionItemKind::FIELD));
        assert_eq!(item.detail.as_deref(), Some("users.email nvarchar(255)"));

        let table = to_completion_item(&BoundSymbol::Table(TableMetadata::new("users", "dbo")));
        assert_eq!(table.detail.as_deref(), Some("dbo.users"));
    }

    #[test]
    fn test_error_conversion() {
        let err: LspError = ConfigError::MissingServerName.into();
        assert!(err.to_string().contains("server name"));
        let err: LspError = BindingError::QueueClosed.into();
        assert!(matches!(err, LspError::Binding(_)));
    }
}
