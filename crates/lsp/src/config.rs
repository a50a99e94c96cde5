// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Service Configuration
//!
//! This module provides configuration management for the language service.
//!
//! ## Configuration Structure
//!
//! The service configuration includes:
//! - The database connection documents are bound to
//! - Binding queue timeouts (operation and lock wait)
//! - Per-feature timeouts for hover and completion
//! - Idle eviction of binding contexts
//! - An optional offline schema file
//!
//! ## Example
//!
//! Client settings, sent as `initializationOptions` or through
//! `workspace/didChangeConfiguration`:
//!
//! ```json
//! {
//!   "sqlTools": {
//!     "connection": { "serverName": "localhost", "databaseName": "shop" },
//!     "bindingTimeoutMs": 500,
//!     "hoverTimeoutMs": 500,
//!     "metadataPath": "/home/me/shop-schema.json"
//!   }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqltools_catalog::{CatalogError, ConnectionDetails, ConnectionInfo};

use crate::binding_queue::{DEFAULT_BINDING_TIMEOUT, DEFAULT_WAIT_FOR_LOCK_TIMEOUT, QueueSettings};

/// Settings section the client sends
pub const SETTINGS_SECTION: &str = "sqlTools";

/// Environment variable naming an offline schema file
pub const METADATA_PATH_ENV: &str = "SQLTOOLS_METADATA_PATH";

/// Main service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// Connection documents are bound to; no binding without one
    pub connection: Option<ConnectionDetails>,

    /// Hover and completion on/off switch
    pub intellisense_enabled: bool,

    /// Default time a binding operation may run (milliseconds)
    pub binding_timeout_ms: u64,

    /// Default time an operation waits for its context (milliseconds)
    pub wait_for_lock_timeout_ms: u64,

    /// Binding timeout for hover requests (milliseconds)
    pub hover_timeout_ms: u64,

    /// Binding timeout for completion requests (milliseconds)
    pub completion_timeout_ms: u64,

    /// Contexts unused this long are disconnected; 0 keeps them forever
    pub idle_context_timeout_secs: u64,

    /// Schema file for the offline metadata provider
    pub metadata_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            connection: None,
            intellisense_enabled: true,
            binding_timeout_ms: DEFAULT_BINDING_TIMEOUT.as_millis() as u64,
            wait_for_lock_timeout_ms: DEFAULT_WAIT_FOR_LOCK_TIMEOUT.as_millis() as u64,
            hover_timeout_ms: 500,
            completion_timeout_ms: 500,
            idle_context_timeout_secs: 600,
            metadata_path: None,
        }
    }
}

impl ServiceConfig {
    /// Builder method: set the connection
    pub fn with_connection(mut self, connection: ConnectionDetails) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Builder method: set the offline schema file
    pub fn with_metadata_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_path = Some(path.into());
        self
    }

    /// Validate the configuration
    ///
    /// Checks that:
    /// - Every timeout is non-zero
    /// - A configured connection names a server
    /// - A configured schema file exists
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("bindingTimeoutMs", self.binding_timeout_ms),
            ("waitForLockTimeoutMs", self.wait_for_lock_timeout_ms),
            ("hoverTimeoutMs", self.hover_timeout_ms),
            ("completionTimeoutMs", self.completion_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidTimeout { name });
        }

        if let Some(connection) = &self.connection {
            if connection.server_name.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::MissingServerName);
            }
        }

        if let Some(path) = &self.metadata_path {
            if !path.is_file() {
                return Err(ConfigError::MetadataFileNotFound { path: path.clone() });
            }
        }

        Ok(())
    }

    /// Parse the service config from an LSP settings payload
    ///
    /// Returns `Ok(None)` when the payload has no `sqlTools` section. Without
    /// a `metadataPath` the `SQLTOOLS_METADATA_PATH` file is used.
    ///
    /// Expected shape:
    /// {
    ///   "sqlTools": { "connection": { ... }, "bindingTimeoutMs": 500, ... }
    /// }
    pub fn from_lsp_settings(settings: &Value) -> Result<Option<Self>, ConfigError> {
        let Some(section) = settings.get(SETTINGS_SECTION) else {
            return Ok(None);
        };

        let mut config: Self =
            serde_json::from_value(section.clone()).map_err(|err| ConfigError::InvalidSettings {
                reason: err.to_string(),
            })?;
        if config.metadata_path.is_none() {
            config.metadata_path = std::env::var_os(METADATA_PATH_ENV).map(PathBuf::from);
        }
        config.validate()?;
        Ok(Some(config))
    }

    /// Config used before client settings arrive
    ///
    /// Picks up an offline schema file from `SQLTOOLS_METADATA_PATH`.
    pub fn default_runtime_fallback() -> Self {
        let metadata_path = std::env::var_os(METADATA_PATH_ENV).map(PathBuf::from);
        Self {
            metadata_path,
            ..Self::default()
        }
    }

    /// Default timeouts for the binding queue
    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            binding_timeout: Duration::from_millis(self.binding_timeout_ms),
            wait_for_lock_timeout: Duration::from_millis(self.wait_for_lock_timeout_ms),
        }
    }

    pub fn hover_timeout(&self) -> Duration {
        Duration::from_millis(self.hover_timeout_ms)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }

    /// Idle eviction age, `None` when disabled
    pub fn idle_context_timeout(&self) -> Option<Duration> {
        (self.idle_context_timeout_secs > 0)
            .then(|| Duration::from_secs(self.idle_context_timeout_secs))
    }

    /// Connection for a document, if one is configured
    pub fn connection_info(&self, owner_uri: &str) -> Option<ConnectionInfo> {
        self.connection
            .as_ref()
            .map(|details| ConnectionInfo::new(owner_uri, details.clone()))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings payload doesn't match the expected shape
    #[error("Invalid settings: {reason}")]
    InvalidSettings { reason: String },

    /// A timeout was set to zero
    #[error("Timeout '{name}' must be greater than zero")]
    InvalidTimeout { name: &'static str },

    /// Connection given without a server
    #[error("Connection requires a server name")]
    MissingServerName,

    /// Offline schema file doesn't exist
    #[error("Metadata file not found: {}", path.display())]
    MetadataFileNotFound { path: PathBuf },

    /// Catalog-related error
    #[error("Catalog error: {0}")]
    CatalogError(#[from] CatalogError),
}
