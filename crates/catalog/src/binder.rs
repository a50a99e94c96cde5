// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Metadata binder
//!
//! Resolves identifiers from a script against the schema a
//! [`MetadataProvider`] exposes. One binder is created per binding context and
//! caches the table list until [`MetadataBinder::refresh`] is called.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::CatalogResult;
use crate::metadata::{ColumnMetadata, TableMetadata, TableType};
use crate::r#trait::MetadataProvider;

/// A schema object an identifier resolved to
#[derive(Debug, Clone, PartialEq)]
pub enum BoundSymbol {
    /// A table or view
    Table(TableMetadata),

    /// A column of `table`
    Column {
        table: String,
        column: ColumnMetadata,
    },
}

impl BoundSymbol {
    /// Name to insert in the editor
    pub fn name(&self) -> &str {
        match self {
            BoundSymbol::Table(table) => &table.name,
            BoundSymbol::Column { column, .. } => &column.name,
        }
    }

    /// Markdown description for hover
    pub fn describe(&self) -> String {
        match self {
            BoundSymbol::Table(table) => {
                let kind = match table.table_type {
                    TableType::View => "view",
                    _ => "table",
                };
                let mut text = format!("**{kind}** `{}`", table.qualified_name());
                if let Some(comment) = &table.comment {
                    text.push_str(&format!("\n\n{comment}"));
                }
                text
            }
            BoundSymbol::Column { table, column } => {
                let nullability = if column.nullable { "null" } else { "not null" };
                let mut text = format!(
                    "**column** `{}.{}` {} {}",
                    table, column.name, column.data_type, nullability
                );
                if column.is_primary_key {
                    text.push_str(" primary key");
                }
                if let Some(reference) = &column.references {
                    text.push_str(&format!(
                        " references `{}.{}`",
                        reference.table, reference.column
                    ));
                }
                if let Some(comment) = &column.comment {
                    text.push_str(&format!("\n\n{comment}"));
                }
                text
            }
        }
    }
}

/// Identifier resolver over one metadata provider
pub struct MetadataBinder {
    provider: Arc<dyn MetadataProvider>,
    tables: RwLock<Option<Arc<Vec<TableMetadata>>>>,
}

impl MetadataBinder {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self {
            provider,
            tables: RwLock::new(None),
        }
    }

    /// The provider this binder reads from
    pub fn provider(&self) -> &Arc<dyn MetadataProvider> {
        &self.provider
    }

    /// Drop the cached table list
    pub fn refresh(&self) {
        *self.tables.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Resolve an identifier to a table, then to a column
    ///
    /// `qualifier.name` resolves `name` as a column of table `qualifier`
    /// when no table `qualifier.name` exists.
    pub fn resolve(&self, identifier: &str) -> CatalogResult<Option<BoundSymbol>> {
        let tables = self.tables()?;

        if let Some(table) = tables.iter().find(|t| t.matches_name(identifier)) {
            return Ok(Some(BoundSymbol::Table(table.clone())));
        }

        let (qualifier, name) = match identifier.rsplit_once('.') {
            Some((qualifier, name)) => (Some(qualifier), name),
            None => (None, identifier),
        };

        let symbol = tables
            .iter()
            .filter(|table| qualifier.is_none_or(|q| table.matches_name(q)))
            .find_map(|table| {
                table.get_column(name).map(|column| BoundSymbol::Column {
                    table: table.name.clone(),
                    column: column.clone(),
                })
            });

        Ok(symbol)
    }

    /// Tables and columns whose names start with `prefix`
    ///
    /// Tables come first, each name appears once, matching is
    /// case-insensitive.
    pub fn completions(&self, prefix: &str) -> CatalogResult<Vec<BoundSymbol>> {
        let tables = self.tables()?;
        let prefix = prefix.to_lowercase();
        let matches = |name: &str| name.to_lowercase().starts_with(&prefix);

        let mut symbols: Vec<BoundSymbol> = tables
            .iter()
            .filter(|table| matches(&table.name))
            .map(|table| BoundSymbol::Table(table.clone()))
            .collect();

        let mut seen_columns = std::collections::HashSet::new();
        for table in tables.iter() {
            for column in table.columns.iter().filter(|c| matches(&c.name)) {
                if seen_columns.insert(column.name.to_lowercase()) {
                    symbols.push(BoundSymbol::Column {
                        table: table.name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }

        Ok(symbols)
    }

    fn tables(&self) -> CatalogResult<Arc<Vec<TableMetadata>>> {
        if let Some(tables) = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(tables.clone());
        }

        let tables = Arc::new(self.provider.list_tables()?);
        debug!(table_count = tables.len(), "cached binder metadata");
        *self.tables.write().unwrap_or_else(PoisonError::into_inner) = Some(tables.clone());
        Ok(tables)
    }
}

impl std::fmt::Debug for MetadataBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataBinder").finish_non_exhaustive()
    }
}
