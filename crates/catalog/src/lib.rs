// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # SQL Tools Service - Catalog Layer
//!
//! This crate is the boundary between the language service and the database.
//! It defines:
//!
//! - **Connection identity**: [`ConnectionDetails`] and [`ConnectionInfo`]
//! - **Boundary traits**: [`ConnectionFactory`], [`ServerConnection`],
//!   [`MetadataProvider`]
//! - **Binding**: [`MetadataBinder`], which resolves identifiers to schema
//!   objects for hover and completion
//! - **Static metadata**: an offline provider and factory for the playground
//!   and tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sqltools_catalog::{MetadataBinder, StaticMetadataProvider};
//!
//! let binder = MetadataBinder::new(Arc::new(StaticMetadataProvider::playground()));
//! let symbol = binder.resolve("orders.user_id")?;
//! ```

pub mod binder;
pub mod connection;
pub mod error;
pub mod metadata;
pub mod r#static;
pub mod r#trait;

// Re-exports
pub use binder::{BoundSymbol, MetadataBinder};
pub use connection::{ConnectionDetails, ConnectionInfo};
pub use error::{CatalogError, CatalogResult};
pub use metadata::{ColumnMetadata, DataType, TableMetadata, TableReference, TableType};
pub use r#static::{StaticConnection, StaticConnectionFactory, StaticMetadataProvider};
pub use r#trait::{ConnectionFactory, MetadataProvider, ServerConnection};
