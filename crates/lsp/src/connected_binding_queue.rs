// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Connected binding queue
//!
//! A [`BindingQueue`] whose contexts are database connections. Each distinct
//! connection identity gets one context holding the server connection and,
//! for features that need it, a metadata provider and [`MetadataBinder`].
//!
//! Documents connected to the same server, database and login share a
//! context, so their hover and completion requests are serialized against
//! one binder.

use std::borrow::Cow;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use sqltools_catalog::{
    ConnectionDetails, ConnectionFactory, ConnectionInfo, MetadataBinder, MetadataProvider,
    ServerConnection,
};
use tracing::{debug, info, warn};

use crate::binding_queue::{
    BindingContext, BindingQueue, BindingRequest, QueueItemHandle, QueueSettings,
};

/// Lower bound for the connection timeout of binding contexts
pub const MIN_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Placeholder for missing key fields
const NULL_KEY_PART: &str = "NULL";

#[derive(Default)]
struct ConnectionState {
    details: Option<ConnectionDetails>,
    connection: Option<Arc<dyn ServerConnection>>,
    provider: Option<Arc<dyn MetadataProvider>>,
    binder: Option<Arc<MetadataBinder>>,
    server_version: Option<String>,
    is_connected: bool,
}

/// Binding context for one connection identity
pub struct ConnectedBindingContext {
    key: String,
    state: RwLock<ConnectionState>,
}

impl BindingContext for ConnectedBindingContext {
    fn create(key: &str) -> Self {
        Self {
            key: key.to_string(),
            state: RwLock::new(ConnectionState::default()),
        }
    }
}

impl ConnectedBindingContext {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_connected(&self) -> bool {
        self.read().is_connected
    }

    /// Binder over this connection's metadata, if metadata was requested
    pub fn binder(&self) -> Option<Arc<MetadataBinder>> {
        self.read().binder.clone()
    }

    pub fn metadata_provider(&self) -> Option<Arc<dyn MetadataProvider>> {
        self.read().provider.clone()
    }

    pub fn server_connection(&self) -> Option<Arc<dyn ServerConnection>> {
        self.read().connection.clone()
    }

    pub fn server_version(&self) -> Option<String> {
        self.read().server_version.clone()
    }

    /// Connection details the context was last connected with
    pub fn connection_details(&self) -> Option<ConnectionDetails> {
        self.read().details.clone()
    }

    fn attach(
        &self,
        details: &ConnectionDetails,
        connection: Arc<dyn ServerConnection>,
        provider: Option<Arc<dyn MetadataProvider>>,
    ) {
        let mut state = self.write();
        state.details = Some(details.clone());
        state.server_version = connection.server_version();
        state.binder = provider
            .as_ref()
            .map(|provider| Arc::new(MetadataBinder::new(provider.clone())));
        state.provider = provider;
        state.connection = Some(connection);
        state.is_connected = true;
    }

    fn mark_failed(&self, details: &ConnectionDetails) {
        let mut state = self.write();
        *state = ConnectionState::default();
        state.details = Some(details.clone());
    }

    /// Close the server connection and drop metadata
    pub fn disconnect(&self) {
        let connection = {
            let mut state = self.write();
            state.is_connected = false;
            state.binder = None;
            state.provider = None;
            state.connection.take()
        };
        if let Some(connection) = connection {
            connection.disconnect();
            debug!(key = %self.key, "binding context disconnected");
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ConnectionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ConnectionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ConnectedBindingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedBindingContext")
            .field("key", &self.key)
            .field("is_connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Binding queue keyed by connection identity
pub struct ConnectedBindingQueue {
    queue: BindingQueue<ConnectedBindingContext>,
    factory: RwLock<Arc<dyn ConnectionFactory>>,
}

impl ConnectedBindingQueue {
    /// Create a queue with default timeouts
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self::with_settings(factory, QueueSettings::default())
    }

    pub fn with_settings(factory: Arc<dyn ConnectionFactory>, settings: QueueSettings) -> Self {
        Self {
            queue: BindingQueue::with_settings(settings),
            factory: RwLock::new(factory),
        }
    }

    /// Factory used for new connections
    pub fn connection_factory(&self) -> Arc<dyn ConnectionFactory> {
        self.factory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap the factory; existing contexts keep their connections
    pub fn set_connection_factory(&self, factory: Arc<dyn ConnectionFactory>) {
        *self.factory.write().unwrap_or_else(PoisonError::into_inner) = factory;
    }

    /// The underlying queue
    pub fn queue(&self) -> &BindingQueue<ConnectedBindingContext> {
        &self.queue
    }

    /// Key of the context for a connection identity
    ///
    /// `server_database_user_auth_display_group`, with `NULL` standing in
    /// for each missing or empty field. `\` and `_` inside a field are
    /// backslash-escaped and a literal `NULL` value becomes `\NULL`, so
    /// distinct identities never share a key.
    pub fn get_connection_context_key(details: &ConnectionDetails) -> String {
        fn part(value: &Option<String>) -> Cow<'_, str> {
            let Some(value) = value.as_deref().filter(|value| !value.is_empty()) else {
                return Cow::Borrowed(NULL_KEY_PART);
            };
            if value == NULL_KEY_PART {
                return Cow::Owned(format!("\\{value}"));
            }
            if value.contains(['\\', '_']) {
                return Cow::Owned(value.replace('\\', "\\\\").replace('_', "\\_"));
            }
            Cow::Borrowed(value)
        }

        format!(
            "{}_{}_{}_{}_{}_{}",
            part(&details.server_name),
            part(&details.database_name),
            part(&details.user_name),
            part(&details.authentication_type),
            part(&details.database_display_name),
            part(&details.group_id),
        )
    }

    /// Make sure a connected context exists for `info` and return its key
    ///
    /// Returns an empty key when `info` is `None`. An existing context is
    /// reused unless `overwrite` is set. A failed connection still yields the
    /// key; the context is then marked disconnected.
    pub async fn add_connection_context(
        &self,
        info: Option<&ConnectionInfo>,
        needs_metadata: bool,
        feature_name: &str,
        overwrite: bool,
    ) -> String {
        let Some(info) = info else {
            return String::new();
        };

        let details = &info.connection_details;
        let key = Self::get_connection_context_key(details);
        if !overwrite && self.queue.binding_context_exists(&key).await {
            return key;
        }

        let wait = self.queue.settings().wait_for_lock_timeout;
        let context = match self.queue.lock_binding_context(&key, wait).await {
            Ok(context) => context,
            Err(err) => {
                warn!(key = %key, error = %err, "could not lock binding context for connect");
                return key;
            }
        };

        if !overwrite && context.is_connected() {
            return key;
        }
        context.disconnect();

        let timeout = details
            .connect_timeout
            .map(Duration::from_secs)
            .unwrap_or_default()
            .max(MIN_CONNECTION_TIMEOUT);

        let factory = self.connection_factory();
        let opened = tokio::time::timeout(
            timeout,
            factory.open_connection(info, feature_name, timeout),
        )
        .await;

        let connection = match opened {
            Ok(Ok(connection)) => connection,
            Ok(Err(err)) => {
                warn!(key = %key, error = %err, "failed to open binding connection");
                context.mark_failed(details);
                return key;
            }
            Err(_) => {
                warn!(key = %key, timeout = ?timeout, "timed out opening binding connection");
                context.mark_failed(details);
                return key;
            }
        };

        let provider = if needs_metadata {
            match factory.create_metadata_provider(&connection) {
                Ok(provider) => Some(provider),
                Err(err) => {
                    warn!(key = %key, error = %err, "failed to create metadata provider");
                    connection.disconnect();
                    context.mark_failed(details);
                    return key;
                }
            }
        } else {
            None
        };

        context.attach(details, connection, provider);
        info!(key = %key, feature = feature_name, needs_metadata, "binding context connected");
        key
    }

    /// Remove and disconnect the context for `info`
    ///
    /// Returns false if there was no such context.
    pub async fn remove_binding_context(&self, info: &ConnectionInfo) -> bool {
        let key = Self::get_connection_context_key(&info.connection_details);
        match self.queue.remove_binding_context(&key).await {
            Some(context) => {
                context.disconnect();
                true
            }
            None => false,
        }
    }

    /// Context for `key`, created disconnected on first use
    pub async fn get_or_create_binding_context(&self, key: &str) -> Arc<ConnectedBindingContext> {
        self.queue.get_or_create_binding_context(key).await
    }

    /// True if a context exists for `key` and is connected
    pub async fn is_binding_context_connected(&self, key: &str) -> bool {
        if !self.queue.binding_context_exists(key).await {
            return false;
        }
        self.queue
            .get_or_create_binding_context(key)
            .await
            .is_connected()
    }

    /// Remove every context connected to `server` and `database`
    ///
    /// Names compare case-insensitively. Returns how many were removed.
    pub async fn close_connections(&self, server: &str, database: &str) -> usize {
        let mut closed = 0;
        for (key, context) in self.queue.binding_contexts().await {
            let Some(details) = context.connection_details() else {
                continue;
            };
            let same_server = details
                .server_name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(server));
            let same_database = details
                .database_name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(database));

            if same_server && same_database {
                if let Some(context) = self.queue.remove_binding_context(&key).await {
                    context.disconnect();
                    closed += 1;
                }
            }
        }

        if closed > 0 {
            info!(server, database, closed, "closed binding connections");
        }
        closed
    }

    /// Queue an operation against a connection context
    pub fn queue_binding_operation<R: Send + 'static>(
        &self,
        request: BindingRequest<ConnectedBindingContext, R>,
    ) -> Option<QueueItemHandle<R>> {
        self.queue.queue_binding_operation(request)
    }

    /// Disconnect and remove contexts unused for at least `max_idle`
    pub async fn prune_idle_contexts(&self, max_idle: Duration) -> Vec<String> {
        self.queue
            .prune_idle_contexts(max_idle)
            .await
            .into_iter()
            .map(|(key, context)| {
                context.disconnect();
                key
            })
            .collect()
    }

    /// Remove and disconnect every context
    pub async fn close_all(&self) {
        for key in self.queue.binding_context_keys().await {
            if let Some(context) = self.queue.remove_binding_context(&key).await {
                context.disconnect();
            }
        }
    }

    /// Stop the queue and disconnect every context
    pub async fn shutdown(&self, timeout: Duration) {
        self.queue.stop_queue_processor(timeout).await;
        self.close_all().await;
    }
}

impl std::fmt::Debug for ConnectedBindingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedBindingQueue")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
