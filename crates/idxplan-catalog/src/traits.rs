//! Catalog traits

use crate::index::IndexDef;
use crate::stats::{Statistic, TableStatistics};
use arrow_schema::SchemaRef;
use idxplan_common::Result;
use std::sync::Arc;

/// Table entry metadata
#[derive(Debug, Clone)]
pub struct TableEntry {
    pub name: String,
    pub database: String,
    pub schema: SchemaRef,
    pub indexes: Vec<IndexDef>,
    /// An index match on this table returns exactly the rows the predicate
    /// selects, so covered filters may be dropped
    pub precise_match: bool,
}

impl TableEntry {
    pub fn new(database: impl Into<String>, name: impl Into<String>, schema: SchemaRef) -> Self {
        Self {
            name: name.into(),
            database: database.into(),
            schema,
            indexes: vec![],
            precise_match: true,
        }
    }

    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_precise_match(mut self, precise_match: bool) -> Self {
        self.precise_match = precise_match;
        self
    }

    pub fn index(&self, id: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.id.eq_ignore_ascii_case(id))
    }

    /// Position of a column in the table schema, used as its column id
    pub fn column_id(&self, name: &str) -> Option<usize> {
        self.schema
            .fields()
            .iter()
            .position(|f| f.name().eq_ignore_ascii_case(name))
    }
}

/// Catalog provider trait
pub trait CatalogProvider: Send + Sync {
    /// List databases
    fn databases(&self) -> Vec<String>;

    /// Check if database exists
    fn database_exists(&self, name: &str) -> bool;

    /// Get schema provider for a database
    fn schema(&self, name: &str) -> Option<Arc<dyn SchemaProvider>>;

    /// Create a database
    fn create_database(&self, name: &str) -> Result<()>;

    /// Drop a database
    fn drop_database(&self, name: &str) -> Result<()>;

    /// Resolve a table in a database
    fn table(&self, database: &str, name: &str) -> Option<TableEntry> {
        self.schema(database)?.table(name)
    }
}

/// Schema provider trait
pub trait SchemaProvider: Send + Sync {
    /// Schema name
    fn name(&self) -> &str;

    /// List tables
    fn tables(&self) -> Vec<String>;

    /// Check if table exists
    fn table_exists(&self, name: &str) -> bool;

    /// Get table metadata
    fn table(&self, name: &str) -> Option<TableEntry>;

    /// Create a table
    fn create_table(&self, entry: TableEntry) -> Result<()>;

    /// Drop a table
    fn drop_table(&self, name: &str) -> Result<()>;

    /// Get table statistics (computed by ANALYZE)
    fn table_statistics(&self, name: &str) -> Option<TableStatistics>;

    /// Store table statistics (called by ANALYZE)
    fn set_table_statistics(&self, name: &str, stats: TableStatistics);
}

/// Source of per-index statistics for the index coster
pub trait StatsProvider: Send + Sync {
    /// Every index statistic recorded for a table
    fn get_table_stats(&self, database: &str, table: &str) -> Result<Vec<Statistic>>;

    /// Table row count
    fn row_count(&self, database: &str, table: &str) -> Result<u64>;

    /// Table size in bytes
    fn data_length(&self, database: &str, table: &str) -> Result<u64>;
}
