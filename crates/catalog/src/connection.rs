// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Connection identity
//!
//! The fields a client sends to describe a database connection. The language
//! service only uses them to derive binding-context keys and to ask a
//! [`crate::ConnectionFactory`] for a connection.

use serde::{Deserialize, Serialize};

/// Connection identity fields, all optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetails {
    /// Server name or address
    #[serde(default)]
    pub server_name: Option<String>,

    /// Database name
    #[serde(default)]
    pub database_name: Option<String>,

    /// Login name
    #[serde(default)]
    pub user_name: Option<String>,

    /// Authentication type (e.g. "SqlLogin", "Integrated")
    #[serde(default)]
    pub authentication_type: Option<String>,

    /// Database name shown in the client
    #[serde(default)]
    pub database_display_name: Option<String>,

    /// Connection group in the client's object explorer
    #[serde(default)]
    pub group_id: Option<String>,

    /// Connection timeout requested by the client (seconds)
    #[serde(default)]
    pub connect_timeout: Option<u64>,
}

impl ConnectionDetails {
    /// Create details for a server/database pair
    pub fn new(server_name: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            server_name: Some(server_name.into()),
            database_name: Some(database_name.into()),
            ..Default::default()
        }
    }

    /// Builder method: set login name and authentication type
    pub fn with_user(mut self, user_name: impl Into<String>, auth_type: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self.authentication_type = Some(auth_type.into());
        self
    }

    /// Builder method: set the display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.database_display_name = Some(display_name.into());
        self
    }

    /// Builder method: set the group id
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }
}

/// A connection owned by one editor document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// URI of the document that owns the connection
    pub owner_uri: String,

    /// Identity of the connection
    pub connection_details: ConnectionDetails,
}

impl ConnectionInfo {
    pub fn new(owner_uri: impl Into<String>, connection_details: ConnectionDetails) -> Self {
        Self {
            owner_uri: owner_uri.into(),
            connection_details,
        }
    }
}
