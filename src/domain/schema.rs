//! Schema definitions handed to the bootstrap.

use serde::Serialize;

/// One table and the DDL that creates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub ddl: String,
}

/// Ordered list of tables to bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    tables: Vec<TableSpec>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a table.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>, ddl: impl Into<String>) -> Self {
        self.tables.push(TableSpec {
            name: name.into(),
            ddl: ddl.into(),
        });
        self
    }

    #[must_use]
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// What a bootstrap run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapSummary {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

impl BootstrapSummary {
    pub(crate) fn record(&mut self, table: &TableSpec, created: bool) {
        if created {
            self.created.push(table.name.clone());
        } else {
            self.existing.push(table.name.clone());
        }
    }
}
