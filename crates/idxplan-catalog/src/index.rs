//! Index definitions

use arrow_schema::DataType;
use idxplan_sql::TypeFamily;
use serde::{Deserialize, Serialize};

/// Kind of index structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IndexClass {
    #[default]
    Default,
    Spatial,
    Fulltext,
    Vector,
}

/// One indexed column or expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexColumn {
    /// Column expression, e.g. `t.a` or `a`
    pub expression: String,
    pub data_type: DataType,
}

impl IndexColumn {
    pub fn new(expression: impl Into<String>, data_type: DataType) -> Self {
        Self {
            expression: expression.into(),
            data_type,
        }
    }

    /// Unqualified lower-cased column name
    pub fn name(&self) -> String {
        let expr = self.expression.to_lowercase();
        match expr.rsplit_once('.') {
            Some((_, name)) => name.to_string(),
            None => expr,
        }
    }
}

/// Index metadata as exposed by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub id: String,
    pub database: String,
    pub table: String,
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
    pub class: IndexClass,
    /// Per-column prefix lengths; empty when every column is indexed whole
    pub prefix_lengths: Vec<u16>,
    pub reversible: bool,
}

impl IndexDef {
    pub fn new(
        id: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<IndexColumn>,
    ) -> Self {
        Self {
            id: id.into(),
            database: database.into(),
            table: table.into(),
            columns,
            unique: false,
            class: IndexClass::Default,
            prefix_lengths: vec![],
            reversible: true,
        }
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_class(mut self, class: IndexClass) -> Self {
        self.class = class;
        self
    }

    pub fn with_prefix_lengths(mut self, prefix_lengths: Vec<u16>) -> Self {
        self.prefix_lengths = prefix_lengths;
        self
    }

    /// Lower-cased column names in index order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(IndexColumn::name).collect()
    }

    pub fn column_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type.clone()).collect()
    }

    /// Ordinal of a column within the index
    pub fn ordinal_of(&self, column: &str) -> Option<usize> {
        let column = column.to_lowercase();
        self.columns.iter().position(|c| c.name() == column)
    }

    pub fn is_spatial(&self) -> bool {
        self.class == IndexClass::Spatial
    }

    pub fn is_fulltext(&self) -> bool {
        self.class == IndexClass::Fulltext
    }

    pub fn is_vector(&self) -> bool {
        self.class == IndexClass::Vector
    }

    pub fn has_prefix_lengths(&self) -> bool {
        self.prefix_lengths.iter().any(|p| *p > 0)
    }

    /// A unique index over a whole text or blob column stores a hash of the
    /// value, so only equality and null tests can use that column. A prefix
    /// length on the column itself stores the prefix instead.
    pub fn is_content_hashed(&self, ordinal: usize) -> bool {
        self.unique
            && self.prefix_lengths.get(ordinal).copied().unwrap_or(0) == 0
            && self
                .columns
                .get(ordinal)
                .is_some_and(|c| TypeFamily::is_text_blob(&c.data_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_lookup() {
        let idx = IndexDef::new(
            "ab",
            "db",
            "t",
            vec![
                IndexColumn::new("t.A", DataType::Int64),
                IndexColumn::new("b", DataType::Utf8),
            ],
        );
        assert_eq!(idx.column_names(), vec!["a", "b"]);
        assert_eq!(idx.ordinal_of("B"), Some(1));
        assert_eq!(idx.ordinal_of("c"), None);
        assert!(!idx.is_content_hashed(1));
        let idx = idx.with_unique(true);
        assert!(idx.is_content_hashed(1));
        assert!(!idx.is_content_hashed(0));
        assert!(!idx.clone().with_prefix_lengths(vec![0, 10]).is_content_hashed(1));
        let prefixed_first = idx.with_prefix_lengths(vec![10, 0]);
        assert!(prefixed_first.is_content_hashed(1));
        assert!(!prefixed_first.is_content_hashed(0));
    }
}
