//! In-memory catalog implementation

use super::{CatalogProvider, SchemaProvider, StatsProvider, TableEntry};
use crate::stats::{Statistic, TableStatistics};
use dashmap::DashMap;
use idxplan_common::{IdxError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// In-memory catalog implementation
pub struct InMemoryCatalog {
    databases: DashMap<String, Arc<InMemorySchema>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        let catalog = Self {
            databases: DashMap::new(),
        };
        // Create default database
        catalog.create_database_sync("default");
        catalog
    }

    fn create_database_sync(&self, name: &str) {
        let key = name.to_lowercase();
        if !self.databases.contains_key(&key) {
            self.databases
                .insert(key, Arc::new(InMemorySchema::new(name.to_lowercase())));
        }
    }

    fn database(&self, name: &str) -> Result<Arc<InMemorySchema>> {
        self.databases
            .get(&name.to_lowercase())
            .map(|s| s.value().clone())
            .ok_or_else(|| IdxError::NotFound(format!("database '{}'", name)))
    }

    /// Record an index statistic for a table
    pub fn add_index_statistic(&self, database: &str, table: &str, stat: Statistic) -> Result<()> {
        self.database(database)?.add_index_statistic(table, stat)
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogProvider for InMemoryCatalog {
    fn databases(&self) -> Vec<String> {
        self.databases.iter().map(|r| r.key().clone()).collect()
    }

    fn database_exists(&self, name: &str) -> bool {
        self.databases.contains_key(&name.to_lowercase())
    }

    fn schema(&self, name: &str) -> Option<Arc<dyn SchemaProvider>> {
        self.databases.get(&name.to_lowercase()).map(|s| {
            let schema: Arc<dyn SchemaProvider> = s.value().clone();
            schema
        })
    }

    fn create_database(&self, name: &str) -> Result<()> {
        if self.database_exists(name) {
            return Err(IdxError::AlreadyExists(format!("database '{}'", name)));
        }
        self.create_database_sync(name);
        Ok(())
    }

    fn drop_database(&self, name: &str) -> Result<()> {
        if !self.database_exists(name) {
            return Err(IdxError::NotFound(format!("database '{}'", name)));
        }
        self.databases.remove(&name.to_lowercase());
        Ok(())
    }
}

impl StatsProvider for InMemoryCatalog {
    fn get_table_stats(&self, database: &str, table: &str) -> Result<Vec<Statistic>> {
        let schema = self.database(database)?;
        if !schema.table_exists(table) {
            return Err(IdxError::NotFound(format!("table '{}.{}'", database, table)));
        }
        Ok(schema.index_statistics(table))
    }

    fn row_count(&self, database: &str, table: &str) -> Result<u64> {
        let schema = self.database(database)?;
        Ok(schema
            .table_statistics(table)
            .map(|s| s.row_count)
            .unwrap_or(0))
    }

    fn data_length(&self, database: &str, table: &str) -> Result<u64> {
        let schema = self.database(database)?;
        Ok(schema
            .table_statistics(table)
            .map(|s| s.total_size_bytes)
            .unwrap_or(0))
    }
}

/// In-memory schema
pub struct InMemorySchema {
    name: String,
    tables: DashMap<String, TableEntry>,
    statistics: DashMap<String, TableStatistics>,
    /// Index statistics per table; readers get cloned snapshots
    index_stats: RwLock<HashMap<String, Vec<Statistic>>>,
}

impl InMemorySchema {
    pub fn new(name: String) -> Self {
        Self {
            name,
            tables: DashMap::new(),
            statistics: DashMap::new(),
            index_stats: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of the index statistics for a table
    pub fn index_statistics(&self, table: &str) -> Vec<Statistic> {
        self.index_stats
            .read()
            .get(&table.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Adds or replaces the statistic with the same qualifier and column list
    pub fn add_index_statistic(&self, table: &str, stat: Statistic) -> Result<()> {
        if !self.table_exists(table) {
            return Err(IdxError::NotFound(format!("table '{}'", table)));
        }
        validate_statistic(&stat)?;
        let mut guard = self.index_stats.write();
        let stats = guard.entry(table.to_lowercase()).or_default();
        stats.retain(|s| !(s.qualifier == stat.qualifier && s.columns == stat.columns));
        debug!(statistic = %stat.qualifier, rows = stat.row_count, "recorded index statistic");
        stats.push(stat);
        Ok(())
    }
}

/// Rejects statistics whose shape does not match their column list
fn validate_statistic(stat: &Statistic) -> Result<()> {
    if stat.columns.len() != stat.types.len() {
        return Err(IdxError::Stats(format!(
            "{}: {} columns but {} types",
            stat.qualifier,
            stat.columns.len(),
            stat.types.len()
        )));
    }
    if let Some(bucket) = stat
        .histogram
        .iter()
        .find(|b| b.lower.len() > stat.columns.len() || b.upper.len() > stat.columns.len())
    {
        return Err(IdxError::Stats(format!(
            "{}: bucket {} is wider than the index",
            stat.qualifier, bucket
        )));
    }
    Ok(())
}

impl SchemaProvider for InMemorySchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn tables(&self) -> Vec<String> {
        self.tables.iter().map(|r| r.key().clone()).collect()
    }

    fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_lowercase())
    }

    fn table(&self, name: &str) -> Option<TableEntry> {
        self.tables
            .get(&name.to_lowercase())
            .map(|e| e.value().clone())
    }

    fn create_table(&self, entry: TableEntry) -> Result<()> {
        if self.table_exists(&entry.name) {
            return Err(IdxError::AlreadyExists(format!("table '{}'", entry.name)));
        }
        debug!(schema = %self.name, table = %entry.name, indexes = entry.indexes.len(), "created table");
        self.tables.insert(entry.name.to_lowercase(), entry);
        Ok(())
    }

    fn drop_table(&self, name: &str) -> Result<()> {
        if !self.table_exists(name) {
            return Err(IdxError::NotFound(format!("table '{}'", name)));
        }
        let key = name.to_lowercase();
        self.tables.remove(&key);
        self.statistics.remove(&key);
        self.index_stats.write().remove(&key);
        Ok(())
    }

    fn table_statistics(&self, name: &str) -> Option<TableStatistics> {
        self.statistics
            .get(&name.to_lowercase())
            .map(|s| s.value().clone())
    }

    fn set_table_statistics(&self, name: &str, stats: TableStatistics) {
        self.statistics.insert(name.to_lowercase(), stats);
    }
}

#[cfg(test)]
mod tests {
    use crate::stats::{HistogramBucket, StatQualifier, Statistic, TableStatistics};
    use crate::{CatalogProvider, InMemoryCatalog, StatsProvider, TableEntry};
    use arrow_schema::{DataType, Field, Schema};
    use idxplan_common::IdxError;
    use idxplan_sql::Literal;
    use std::sync::Arc;

    fn test_schema() -> arrow_schema::SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]))
    }

    fn test_table_entry() -> TableEntry {
        TableEntry::new("default", "test_table", test_schema())
    }

    fn id_stat(rows: f64) -> Statistic {
        Statistic::new(
            StatQualifier::new("default", "default", "test_table", "primary"),
            vec!["id".into()],
            vec![DataType::Int64],
        )
        .with_row_count(rows)
    }

    #[test]
    fn test_catalog_databases() {
        let catalog = InMemoryCatalog::new();

        // Default database should exist
        assert!(catalog.database_exists("default"));

        let dbs = catalog.databases();
        assert_eq!(dbs.len(), 1);
        assert!(dbs.contains(&"default".to_string()));
    }

    #[test]
    fn test_create_drop_database() {
        let catalog = InMemoryCatalog::new();

        catalog.create_database("testdb").unwrap();
        assert!(catalog.database_exists("TestDB"));

        // Can't create duplicate
        assert!(catalog.create_database("testdb").is_err());

        catalog.drop_database("testdb").unwrap();
        assert!(!catalog.database_exists("testdb"));

        // Can't drop non-existent
        assert!(catalog.drop_database("nonexistent").is_err());
    }

    #[test]
    fn test_create_drop_table() {
        let catalog = InMemoryCatalog::new();
        let schema = catalog.schema("default").unwrap();

        let entry = test_table_entry();
        schema.create_table(entry.clone()).unwrap();
        assert!(schema.table_exists("TEST_TABLE"));
        assert!(catalog.table("default", "test_table").is_some());

        // Can't create duplicate
        assert!(schema.create_table(entry).is_err());

        schema.drop_table("test_table").unwrap();
        assert!(!schema.table_exists("test_table"));
        assert!(schema.drop_table("nonexistent").is_err());
    }

    #[test]
    fn test_table_statistics() {
        let catalog = InMemoryCatalog::new();
        let schema = catalog.schema("default").unwrap();
        schema.create_table(test_table_entry()).unwrap();

        // No stats initially
        assert!(schema.table_statistics("test_table").is_none());
        assert_eq!(catalog.row_count("default", "test_table").unwrap(), 0);

        schema.set_table_statistics(
            "test_table",
            TableStatistics {
                row_count: 1000,
                total_size_bytes: 20000,
                last_analyzed: 1700000000,
            },
        );

        assert_eq!(catalog.row_count("default", "test_table").unwrap(), 1000);
        assert_eq!(catalog.data_length("default", "test_table").unwrap(), 20000);
    }

    #[test]
    fn test_index_statistics_replace_and_drop() {
        let catalog = InMemoryCatalog::new();
        let schema = catalog.schema("default").unwrap();
        schema.create_table(test_table_entry()).unwrap();

        catalog
            .add_index_statistic("default", "test_table", id_stat(10.0))
            .unwrap();
        catalog
            .add_index_statistic("default", "test_table", id_stat(20.0))
            .unwrap();
        let stats = catalog.get_table_stats("default", "test_table").unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].row_count, 20.0);

        assert!(catalog
            .add_index_statistic("default", "missing", id_stat(1.0))
            .is_err());
        assert!(catalog.get_table_stats("default", "missing").is_err());

        let mistyped = Statistic {
            types: vec![],
            ..id_stat(5.0)
        };
        let err = catalog
            .add_index_statistic("default", "test_table", mistyped)
            .unwrap_err();
        assert!(matches!(err, IdxError::Stats(_)), "{err}");

        let wide = id_stat(5.0).with_histogram(vec![HistogramBucket::new(
            vec![Literal::Int(0), Literal::Int(0)],
            vec![Literal::Int(9), Literal::Int(9)],
            5.0,
            5.0,
        )]);
        let err = catalog
            .add_index_statistic("default", "test_table", wide)
            .unwrap_err();
        assert!(matches!(err, IdxError::Stats(_)), "{err}");
        assert_eq!(
            catalog.get_table_stats("default", "test_table").unwrap()[0].row_count,
            20.0
        );

        // Drop table should also remove stats
        schema.drop_table("test_table").unwrap();
        schema.create_table(test_table_entry()).unwrap();
        assert!(catalog
            .get_table_stats("default", "test_table")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_concurrent_readers() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog
            .schema("default")
            .unwrap()
            .create_table(test_table_entry())
            .unwrap();
        catalog
            .add_index_statistic("default", "test_table", id_stat(5.0))
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let catalog = Arc::clone(&catalog);
                std::thread::spawn(move || {
                    let stats = catalog.get_table_stats("default", "test_table").unwrap();
                    stats[0].row_count
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 5.0);
        }
    }
}
