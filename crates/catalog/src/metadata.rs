// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Metadata types for database schema information
//!
//! This module defines the types used to represent database schema metadata
//! handed out by a [`crate::MetadataProvider`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// SQL data types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum DataType {
    // Numeric types
    Integer,
    BigInt,
    SmallInt,
    TinyInt,
    Bit,
    Decimal,
    Float,
    Money,

    // String types
    Varchar(Option<usize>),
    NVarchar(Option<usize>),
    Char(Option<usize>),
    Text,

    // Binary types
    VarBinary(Option<usize>),

    // Date/Time types
    Date,
    Time,
    DateTime,
    DateTimeOffset,

    // Special types
    UniqueIdentifier,
    Xml,

    // Unknown/Other (with original type name)
    Other(String),
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn sized(f: &mut fmt::Formatter<'_>, name: &str, size: &Option<usize>) -> fmt::Result {
            match size {
                Some(size) => write!(f, "{name}({size})"),
                None => write!(f, "{name}(max)"),
            }
        }

        match self {
            DataType::Integer => f.write_str("int"),
            DataType::BigInt => f.write_str("bigint"),
            DataType::SmallInt => f.write_str("smallint"),
            DataType::TinyInt => f.write_str("tinyint"),
            DataType::Bit => f.write_str("bit"),
            DataType::Decimal => f.write_str("decimal"),
            DataType::Float => f.write_str("float"),
            DataType::Money => f.write_str("money"),
            DataType::Varchar(size) => sized(f, "varchar", size),
            DataType::NVarchar(size) => sized(f, "nvarchar", size),
            DataType::Char(size) => sized(f, "char", size),
            DataType::Text => f.write_str("text"),
            DataType::VarBinary(size) => sized(f, "varbinary", size),
            DataType::Date => f.write_str("date"),
            DataType::Time => f.write_str("time"),
            DataType::DateTime => f.write_str("datetime"),
            DataType::DateTimeOffset => f.write_str("datetimeoffset"),
            DataType::UniqueIdentifier => f.write_str("uniqueidentifier"),
            DataType::Xml => f.write_str("xml"),
            DataType::Other(name) => f.write_str(name),
        }
    }
}

/// Table type classification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableType {
    #[default]
    Table,
    View,
    System,
    Other(String),
}

/// Reference to a table (for foreign keys)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableReference {
    pub table: String,
    pub column: String,
}

/// Metadata for a database column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    /// Column name
    pub name: String,
    /// Data type
    pub data_type: DataType,
    /// Whether the column is nullable
    #[serde(default)]
    pub nullable: bool,
    /// Default value (as SQL expression string)
    #[serde(default)]
    pub default_value: Option<String>,
    /// Column comment/description
    #[serde(default)]
    pub comment: Option<String>,
    /// Whether this is a primary key column
    #[serde(default)]
    pub is_primary_key: bool,
    /// Referenced table (if foreign key)
    #[serde(default)]
    pub references: Option<TableReference>,
}

impl ColumnMetadata {
    /// Create a new column metadata with builder pattern
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
            default_value: None,
            comment: None,
            is_primary_key: false,
            references: None,
        }
    }

    /// Builder method: set nullable
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Builder method: set default value
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }

    /// Builder method: set comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Builder method: mark as primary key
    pub fn with_primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    /// Builder method: set foreign key reference
    pub fn with_foreign_key(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(TableReference {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// Whether this column references another table
    pub fn is_foreign_key(&self) -> bool {
        self.references.is_some()
    }
}

/// Metadata for a database table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    /// Table name
    pub name: String,
    /// Schema name
    pub schema: String,
    /// Column definitions
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    /// Table comment/description
    #[serde(default)]
    pub comment: Option<String>,
    /// Table type (TABLE, VIEW, ...)
    #[serde(default)]
    pub table_type: TableType,
}

impl TableMetadata {
    /// Create new table metadata with builder pattern
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            columns: Vec::new(),
            comment: None,
            table_type: TableType::Table,
        }
    }

    /// Builder method: add columns
    pub fn with_columns(mut self, columns: Vec<ColumnMetadata>) -> Self {
        self.columns = columns;
        self
    }

    /// Builder method: set comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Builder method: set table type
    pub fn with_type(mut self, table_type: TableType) -> Self {
        self.table_type = table_type;
        self
    }

    /// Schema-qualified name, e.g. `dbo.users`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Get column by name (case-insensitive)
    pub fn get_column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// True if `name` is this table's bare or schema-qualified name
    pub fn matches_name(&self, name: &str) -> bool {
        match name.split_once('.') {
            Some((schema, table)) => {
                self.schema.eq_ignore_ascii_case(schema) && self.name.eq_ignore_ascii_case(table)
            }
            None => self.name.eq_ignore_ascii_case(name),
        }
    }
}
