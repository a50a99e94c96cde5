// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Static metadata
//!
//! Offline [`MetadataProvider`] and [`ConnectionFactory`] backed by predefined
//! schema data. Used by the playground, by tests, and when the service is
//! started with a schema file instead of a live server.
//!
//! ## Schema file format
//!
//! ```json
//! {
//!   "tables": [
//!     { "name": "users", "schema": "dbo",
//!       "columns": [{ "name": "id", "dataType": "integer", "isPrimaryKey": true }] }
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::connection::ConnectionInfo;
use crate::metadata::{ColumnMetadata, DataType, TableMetadata};
use crate::r#trait::{ConnectionFactory, MetadataProvider, ServerConnection};
use crate::{CatalogError, CatalogResult};

#[derive(Debug, Deserialize)]
struct SchemaFile {
    tables: Vec<TableMetadata>,
}

/// Metadata provider with a fixed table list
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataProvider {
    tables: Vec<TableMetadata>,
}

impl StaticMetadataProvider {
    pub fn new(tables: Vec<TableMetadata>) -> Self {
        Self { tables }
    }

    /// Provider with the playground schema: `users`, `orders`, `order_items`
    pub fn playground() -> Self {
        let users = TableMetadata::new("users", "dbo")
            .with_comment("User accounts table")
            .with_columns(vec![
                ColumnMetadata::new("id", DataType::Integer).with_primary_key(),
                ColumnMetadata::new("name", DataType::NVarchar(Some(100))).with_comment("User name"),
                ColumnMetadata::new("email", DataType::NVarchar(Some(255)))
                    .with_comment("User email address"),
                ColumnMetadata::new("created_at", DataType::DateTime)
                    .with_nullable(true)
                    .with_default("GETDATE()")
                    .with_comment("Account creation timestamp"),
            ]);

        let orders = TableMetadata::new("orders", "dbo")
            .with_comment("Customer orders table")
            .with_columns(vec![
                ColumnMetadata::new("id", DataType::Integer).with_primary_key(),
                ColumnMetadata::new("user_id", DataType::Integer)
                    .with_foreign_key("users", "id")
                    .with_comment("Foreign key to users.id"),
                ColumnMetadata::new("total", DataType::Money).with_comment("Order total amount"),
                ColumnMetadata::new("status", DataType::Varchar(Some(20)))
                    .with_nullable(true)
                    .with_default("'pending'")
                    .with_comment("Order status"),
                ColumnMetadata::new("created_at", DataType::DateTime)
                    .with_nullable(true)
                    .with_default("GETDATE()"),
            ]);

        let order_items = TableMetadata::new("order_items", "dbo")
            .with_comment("Order line items table")
            .with_columns(vec![
                ColumnMetadata::new("id", DataType::Integer).with_primary_key(),
                ColumnMetadata::new("order_id", DataType::Integer)
                    .with_foreign_key("orders", "id")
                    .with_comment("Foreign key to orders.id"),
                ColumnMetadata::new("product_name", DataType::NVarchar(Some(255))),
                ColumnMetadata::new("quantity", DataType::Integer),
                ColumnMetadata::new("price", DataType::Decimal),
            ]);

        Self::new(vec![users, orders, order_items])
    }

    /// Parse a schema document
    ///
    /// # Errors
    ///
    /// Returns `SerializationError` if the JSON is malformed.
    pub fn from_json_str(json: &str) -> CatalogResult<Self> {
        let schema: SchemaFile = serde_json::from_str(json)?;
        Ok(Self::new(schema.tables))
    }

    /// Load a schema document from disk
    ///
    /// # Errors
    ///
    /// - `ConfigurationError` if the file can't be read
    /// - `SerializationError` if the JSON is malformed
    pub async fn from_file(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|err| {
            CatalogError::ConfigurationError(format!("cannot read {}: {err}", path.display()))
        })?;
        let provider = Self::from_json_str(&json)?;
        info!(path = %path.display(), tables = provider.tables.len(), "loaded static schema");
        Ok(provider)
    }
}

impl MetadataProvider for StaticMetadataProvider {
    fn list_tables(&self) -> CatalogResult<Vec<TableMetadata>> {
        Ok(self.tables.clone())
    }

    fn get_columns(&self, table: &str) -> CatalogResult<Vec<ColumnMetadata>> {
        self.tables
            .iter()
            .find(|t| t.matches_name(table))
            .map(|t| t.columns.clone())
            .ok_or_else(|| {
                let schema = table.split_once('.').map_or("dbo", |(schema, _)| schema);
                CatalogError::TableNotFound(table.to_string(), schema.to_string())
            })
    }
}

/// Connection handed out by [`StaticConnectionFactory`]
#[derive(Debug)]
pub struct StaticConnection {
    server_name: String,
    database_name: Option<String>,
    open: AtomicBool,
}

impl StaticConnection {
    pub fn new(server_name: impl Into<String>, database_name: Option<String>) -> Self {
        Self {
            server_name: server_name.into(),
            database_name,
            open: AtomicBool::new(true),
        }
    }
}

impl ServerConnection for StaticConnection {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    fn server_version(&self) -> Option<String> {
        Some(format!("static-{}", env!("CARGO_PKG_VERSION")))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn disconnect(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            debug!(server = %self.server_name, "static connection closed");
        }
    }
}

/// Factory whose connections all share one [`StaticMetadataProvider`]
///
/// Opening fails when the connection details name no server.
#[derive(Debug, Clone)]
pub struct StaticConnectionFactory {
    provider: Arc<StaticMetadataProvider>,
}

impl StaticConnectionFactory {
    pub fn new(provider: StaticMetadataProvider) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }
}

impl Default for StaticConnectionFactory {
    fn default() -> Self {
        Self::new(StaticMetadataProvider::playground())
    }
}

#[async_trait]
impl ConnectionFactory for StaticConnectionFactory {
    async fn open_connection(
        &self,
        info: &ConnectionInfo,
        feature_name: &str,
        _timeout: Duration,
    ) -> CatalogResult<Arc<dyn ServerConnection>> {
        let details = &info.connection_details;
        let server = details
            .server_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CatalogError::ConnectionFailed("no server name given".to_string()))?;

        debug!(server, feature_name, "opening static connection");
        Ok(Arc::new(StaticConnection::new(
            server,
            details.database_name.clone(),
        )))
    }

    fn create_metadata_provider(
        &self,
        connection: &Arc<dyn ServerConnection>,
    ) -> CatalogResult<Arc<dyn MetadataProvider>> {
        if !connection.is_open() {
            return Err(CatalogError::ConnectionClosed(
                connection.server_name().to_string(),
            ));
        }
        Ok(self.provider.clone())
    }
}
