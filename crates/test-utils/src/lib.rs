// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Testing utilities for the SQL tools service
//!
//! This crate provides common testing components including:
//! - Mock connection factory and metadata provider with failure and delay knobs
//! - Test fixtures: sample scripts and connection details

pub mod fixtures;
pub mod mock_catalog;

// Re-exports for convenience
pub use fixtures::{ConnectionFixtures, SqlFixtures};
pub use mock_catalog::{
    MockConnection, MockConnectionFactory, MockMetadataProvider, MockMetadataProviderBuilder,
};
