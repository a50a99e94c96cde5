// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Boundary traits for connections and metadata
//!
//! The language service never talks to a database driver directly. It asks a
//! [`ConnectionFactory`] for a [`ServerConnection`] and, when semantic binding
//! is needed, for a [`MetadataProvider`] over that connection.
//!
//! # Examples
//!
//! ```rust,ignore
//! use sqltools_catalog::{ConnectionFactory, ConnectionInfo};
//!
//! async fn table_names(
//!     factory: &dyn ConnectionFactory,
//!     info: &ConnectionInfo,
//! ) -> CatalogResult<Vec<String>> {
//!     let connection = factory
//!         .open_connection(info, "IntelliSense", Duration::from_secs(30))
//!         .await?;
//!     let provider = factory.create_metadata_provider(&connection)?;
//!     Ok(provider.list_tables()?.into_iter().map(|t| t.name).collect())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::connection::ConnectionInfo;
use crate::error::CatalogResult;
use crate::metadata::{ColumnMetadata, TableMetadata};

/// An open connection to a database server
pub trait ServerConnection: Send + Sync {
    /// Server the connection points at
    fn server_name(&self) -> &str;

    /// Current database, if any
    fn database_name(&self) -> Option<&str>;

    /// Server version string reported at connect time
    fn server_version(&self) -> Option<String>;

    /// Whether the connection is still usable
    fn is_open(&self) -> bool;

    /// Close the connection; closing twice is a no-op
    fn disconnect(&self);
}

/// Schema metadata source bound to one connection
///
/// Calls are synchronous: they run inside binding operations, which the
/// binding queue executes on blocking worker threads.
pub trait MetadataProvider: Send + Sync {
    /// List all tables visible to the connection
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::ConnectionClosed` if the connection is gone.
    fn list_tables(&self) -> CatalogResult<Vec<TableMetadata>>;

    /// Get column metadata for a table
    ///
    /// `table` may be bare (`users`) or schema-qualified (`dbo.users`).
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::TableNotFound` if the table doesn't exist.
    fn get_columns(&self, table: &str) -> CatalogResult<Vec<ColumnMetadata>>;
}

/// Opens connections and builds metadata providers over them
#[async_trait::async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a server connection for `info`
    ///
    /// `feature_name` identifies the caller in server-side session
    /// information (e.g. "IntelliSense").
    async fn open_connection(
        &self,
        info: &ConnectionInfo,
        feature_name: &str,
        timeout: Duration,
    ) -> CatalogResult<Arc<dyn ServerConnection>>;

    /// Create a metadata provider over an open connection
    fn create_metadata_provider(
        &self,
        connection: &Arc<dyn ServerConnection>,
    ) -> CatalogResult<Arc<dyn MetadataProvider>>;
}
