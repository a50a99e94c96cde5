// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # SQL Tools Service - Language Server
//!
//! This crate provides the LSP server for the SQL tools service.
//!
//! ## Overview
//!
//! The server provides:
//! - Hover and completion over table and column metadata
//! - A key-partitioned binding queue that serializes work per connection
//! - Connection contexts shared by every document on the same connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Client (VS Code, etc.)          │
//! └──────────────┬──────────────────────────┘
//!                │ LSP Protocol
//!                ↓
//! ┌─────────────────────────────────────────┐
//! │         LSP Backend (tower-lsp)         │
//! ├─────────────────────────────────────────┤
//! │  • did_open / did_change / did_close    │
//! │  • hover / completion                   │
//! └──────────────┬──────────────────────────┘
//!                │
//!                ↓
//! ┌─────────────────────────────────────────┐
//! │            LanguageService              │
//! └──────┬────────────────────────┬─────────┘
//!        ↓                        ↓
//! ┌────────────┐      ┌──────────────────────┐
//! │ Workspace  │      │ ConnectedBindingQueue│
//! │ (buffers)  │      │  → BindingQueue      │
//! └────────────┘      │  → MetadataBinder    │
//!                     └──────────────────────┘
//! ```
//!
//! ## Binding queue
//!
//! Work items carry a context key. Items with the same key run one at a
//! time in submission order; items with different keys run concurrently.
//! An item that outlives its binding timeout is answered by its timeout
//! operation while the worker finishes in the background, still holding
//! the context lock.
//!
//! See [`binding_queue`] for the item lifecycle.
//!
//! ## Configuration
//!
//! Client settings arrive as `initializationOptions` or through
//! `workspace/didChangeConfiguration`:
//!
//! ```json
//! {
//!   "sqlTools": {
//!     "connection": { "serverName": "localhost", "databaseName": "shop" },
//!     "hoverTimeoutMs": 500
//!   }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`backend`]: tower-lsp server implementation
//! - [`binding_queue`]: key-partitioned work queue
//! - [`connected_binding_queue`]: binding contexts backed by connections
//! - [`config`]: service configuration and validation
//! - [`service`]: hover and completion pipeline
//!
//! ## Error Handling
//!
//! The server degrades instead of failing requests:
//! - Missing configuration → no binding, hover and completion return nothing
//! - Failed connection → context kept but marked disconnected
//! - Timed out lookup → timeout result, logged at debug
//!
//! ## Testing
//!
//! ```bash
//! cargo test -p sqltools-lsp
//! ```

pub mod backend;
pub mod binding_queue;
pub mod config;
pub mod connected_binding_queue;
pub mod service;

// Re-exports for convenience
pub use backend::{LspBackend, LspError};
pub use binding_queue::{
    BindingContext, BindingError, BindingOutcome, BindingQueue, BindingRequest, ContextGuard,
    ItemState, QueueItemHandle, QueueSettings,
};
pub use config::{ConfigError, ServiceConfig};
pub use connected_binding_queue::{ConnectedBindingContext, ConnectedBindingQueue};
pub use service::{HoverInfo, LanguageService, connection_factory_for};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name
pub const SERVER_NAME: &str = "sqltools-lsp";
