// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Mock connection factory and metadata provider for testing
//!
//! Both sides can be told to fail or to stall, and they count how often they
//! were used, so tests can observe what the binding queue did.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqltools_catalog::{
    CatalogError, CatalogResult, ColumnMetadata, ConnectionFactory, ConnectionInfo, DataType,
    MetadataProvider, ServerConnection, TableMetadata,
};

/// In-memory metadata provider for testing
///
/// Lookups run on the caller's thread, so `delay` blocks it the way a slow
/// catalog query would.
#[derive(Debug, Default)]
pub struct MockMetadataProvider {
    tables: Vec<TableMetadata>,
    delay: Option<Duration>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockMetadataProvider {
    /// Create a new empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lookups served, failed ones included
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every following lookup fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn begin_call(&self) -> CatalogResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(CatalogError::ConnectionClosed("mock".to_string()));
        }
        Ok(())
    }
}

impl MetadataProvider for MockMetadataProvider {
    fn list_tables(&self) -> CatalogResult<Vec<TableMetadata>> {
        self.begin_call()?;
        Ok(self.tables.clone())
    }

    fn get_columns(&self, table: &str) -> CatalogResult<Vec<ColumnMetadata>> {
        self.begin_call()?;
        self.tables
            .iter()
            .find(|t| t.matches_name(table))
            .map(|t| t.columns.clone())
            .ok_or_else(|| CatalogError::TableNotFound(table.to_string(), "mock".to_string()))
    }
}

/// Builder for creating mock providers with a fluent API
#[derive(Debug, Default)]
pub struct MockMetadataProviderBuilder {
    provider: MockMetadataProvider,
}

impl MockMetadataProviderBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the standard test schema (users and orders tables)
    pub fn with_standard_schema(self) -> Self {
        self.with_table(
            TableMetadata::new("users", "dbo")
                .with_columns(vec![
                    ColumnMetadata::new("id", DataType::Integer)
                        .with_nullable(false)
                        .with_primary_key(),
                    ColumnMetadata::new("email", DataType::NVarchar(Some(255)))
                        .with_nullable(false),
                    ColumnMetadata::new("name", DataType::NVarchar(Some(100))),
                ])
                .with_comment("User account information"),
        )
        .with_table(TableMetadata::new("orders", "dbo").with_columns(vec![
            ColumnMetadata::new("id", DataType::Integer)
                .with_nullable(false)
                .with_primary_key(),
            ColumnMetadata::new("user_id", DataType::Integer)
                .with_nullable(false)
                .with_foreign_key("users", "id"),
            ColumnMetadata::new("total", DataType::Money),
        ]))
    }

    /// Add a custom table
    pub fn with_table(mut self, table: TableMetadata) -> Self {
        self.provider.tables.push(table);
        self
    }

    /// Stall every lookup for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.provider.delay = Some(delay);
        self
    }

    /// Fail every lookup
    pub fn failing(self) -> Self {
        self.provider.set_failing(true);
        self
    }

    /// Build the mock provider
    pub fn build(self) -> MockMetadataProvider {
        self.provider
    }
}

/// Connection handed out by [`MockConnectionFactory`]
#[derive(Debug)]
pub struct MockConnection {
    server_name: String,
    database_name: Option<String>,
    open: AtomicBool,
}

impl MockConnection {
    fn new(info: &ConnectionInfo) -> Self {
        let details = &info.connection_details;
        Self {
            server_name: details.server_name.clone().unwrap_or_default(),
            database_name: details.database_name.clone(),
            open: AtomicBool::new(true),
        }
    }
}

impl ServerConnection for MockConnection {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    fn server_version(&self) -> Option<String> {
        Some("mock-16.0".to_string())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn disconnect(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Connection factory for testing
///
/// Records every open request and keeps the connections it handed out.
#[derive(Debug, Default)]
pub struct MockConnectionFactory {
    provider: Arc<MockMetadataProvider>,
    open_delay: Option<Duration>,
    fail_connect: AtomicBool,
    opens: AtomicUsize,
    requests: Mutex<Vec<(String, Duration)>>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockConnectionFactory {
    /// Factory serving the standard test schema
    pub fn new() -> Self {
        Self::with_provider(MockMetadataProviderBuilder::new().with_standard_schema().build())
    }

    pub fn with_provider(provider: MockMetadataProvider) -> Self {
        Self {
            provider: Arc::new(provider),
            ..Default::default()
        }
    }

    /// Builder method: stall every open for `delay`
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Make every following open fail
    pub fn set_failing(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn provider(&self) -> &Arc<MockMetadataProvider> {
        &self.provider
    }

    /// Number of open attempts, failed ones included
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Feature name and timeout of every open attempt, in order
    pub fn open_requests(&self) -> Vec<(String, Duration)> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Connections handed out so far
    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections
            .lock()
            .map(|connections| connections.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn open_connection(
        &self,
        info: &ConnectionInfo,
        feature_name: &str,
        timeout: Duration,
    ) -> CatalogResult<Arc<dyn ServerConnection>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((feature_name.to_string(), timeout));
        }
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(CatalogError::ConnectionFailed("mock refused".to_string()));
        }

        let connection = Arc::new(MockConnection::new(info));
        if let Ok(mut connections) = self.connections.lock() {
            connections.push(Arc::clone(&connection));
        }
        Ok(connection)
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
        Ok(Arc::clone(&self.provider) as Arc<dyn MetadataProvider>)
    }
}
