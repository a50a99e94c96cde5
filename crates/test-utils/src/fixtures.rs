// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Test fixtures: sample scripts and connections

use sqltools_catalog::{ConnectionDetails, ConnectionInfo};

/// Sample T-SQL scripts for testing
pub struct SqlFixtures;

impl SqlFixtures {
    /// Two-line script over a system view
    pub const fn system_objects() -> &'static str {
        "SELECT *\r\nFROM sys.objects as o1"
    }

    /// Query over the playground schema
    pub const fn orders_by_user() -> &'static str {
        "SELECT u.name, o.total\nFROM dbo.users u\nJOIN dbo.orders o ON o.user_id = u.id"
    }

    /// Script with a trailing empty line
    pub const fn trailing_newline() -> &'static str {
        "SELECT 1\n"
    }

    /// Script mixing all three line separators
    pub const fn mixed_line_endings() -> &'static str {
        "SELECT 1\r\nSELECT 2\nSELECT 3\rSELECT 4"
    }
}

/// Sample connections for testing
pub struct ConnectionFixtures;

impl ConnectionFixtures {
    /// SQL login against the shop database
    pub fn shop() -> ConnectionDetails {
        ConnectionDetails::new("localhost", "shop").with_user("sa", "SqlLogin")
    }

    /// Same server, a different database
    pub fn warehouse() -> ConnectionDetails {
        ConnectionDetails::new("localhost", "warehouse").with_user("sa", "SqlLogin")
    }

    /// Connection owned by `uri`
    pub fn info(uri: &str, details: ConnectionDetails) -> ConnectionInfo {
        ConnectionInfo::new(uri, details)
    }
}
