//! Table and index statistics for cost-based index selection

use crate::fds::FuncDepSet;
use crate::index::IndexClass;
use arrow_schema::DataType;
use chrono::{DateTime, Utc};
use idxplan_common::IdSet;
use idxplan_sql::Literal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Statistics for a table, computed by ANALYZE
#[derive(Debug, Clone, Default)]
pub struct TableStatistics {
    /// Total number of rows in the table
    pub row_count: u64,
    /// Total size in bytes (estimated)
    pub total_size_bytes: u64,
    /// Unix timestamp of when stats were last computed (seconds since epoch)
    pub last_analyzed: i64,
}

impl TableStatistics {
    /// Average row width, 0 for an empty table
    pub fn avg_row_size(&self) -> u64 {
        self.total_size_bytes.checked_div(self.row_count).unwrap_or(0)
    }
}

/// Identifies the index a statistic describes. All parts are lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatQualifier {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub index: String,
}

impl StatQualifier {
    pub fn new(database: &str, schema: &str, table: &str, index: &str) -> Self {
        Self {
            database: database.to_lowercase(),
            schema: schema.to_lowercase(),
            table: table.to_lowercase(),
            index: index.to_lowercase(),
        }
    }
}

impl fmt::Display for StatQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.table, self.index)
    }
}

/// One histogram bucket. Bounds are key prefixes over the index columns and
/// are inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub lower: Vec<Literal>,
    pub upper: Vec<Literal>,
    pub row_count: f64,
    pub distinct_count: f64,
    pub null_count: f64,
    /// Most common values (full or prefix keys) with per-value counts
    pub mcvs: Vec<Vec<Literal>>,
    pub mcv_counts: Vec<f64>,
}

impl HistogramBucket {
    pub fn new(lower: Vec<Literal>, upper: Vec<Literal>, row_count: f64, distinct_count: f64) -> Self {
        Self {
            lower,
            upper,
            row_count,
            distinct_count,
            null_count: 0.0,
            mcvs: vec![],
            mcv_counts: vec![],
        }
    }

    pub fn with_null_count(mut self, null_count: f64) -> Self {
        self.null_count = null_count;
        self
    }

    pub fn with_mcvs(mut self, mcvs: Vec<Vec<Literal>>, counts: Vec<f64>) -> Self {
        self.mcvs = mcvs;
        self.mcv_counts = counts;
        self
    }
}

impl fmt::Display for HistogramBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = |k: &[Literal]| {
            k.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        write!(
            f,
            "[{}..{}] rows={:.1} distinct={:.1} nulls={:.1}",
            key(&self.lower),
            key(&self.upper),
            self.row_count,
            self.distinct_count,
            self.null_count
        )
    }
}

/// Per-index statistic. Immutable; narrowed copies come from the `with_*`
/// builders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistic {
    pub qualifier: StatQualifier,
    pub row_count: f64,
    pub distinct_count: f64,
    pub null_count: f64,
    pub avg_size: u64,
    pub created_at: DateTime<Utc>,
    pub columns: Vec<String>,
    pub types: Vec<DataType>,
    /// Table column ids of the index columns, in index order
    pub col_ids: Vec<usize>,
    pub histogram: Vec<HistogramBucket>,
    pub fds: FuncDepSet,
    pub class: IndexClass,
}

impl Statistic {
    pub fn new(qualifier: StatQualifier, columns: Vec<String>, types: Vec<DataType>) -> Self {
        let columns = columns.into_iter().map(|c| c.to_lowercase()).collect();
        Self {
            qualifier,
            row_count: 0.0,
            distinct_count: 0.0,
            null_count: 0.0,
            avg_size: 0,
            created_at: Utc::now(),
            columns,
            types,
            col_ids: vec![],
            histogram: vec![],
            fds: FuncDepSet::default(),
            class: IndexClass::Default,
        }
    }

    pub fn with_row_count(&self, row_count: f64) -> Self {
        Self {
            row_count,
            ..self.clone()
        }
    }

    pub fn with_distinct_count(&self, distinct_count: f64) -> Self {
        Self {
            distinct_count,
            ..self.clone()
        }
    }

    pub fn with_null_count(&self, null_count: f64) -> Self {
        Self {
            null_count,
            ..self.clone()
        }
    }

    pub fn with_avg_size(&self, avg_size: u64) -> Self {
        Self {
            avg_size,
            ..self.clone()
        }
    }

    pub fn with_histogram(&self, histogram: Vec<HistogramBucket>) -> Self {
        Self {
            histogram,
            ..self.clone()
        }
    }

    pub fn with_func_deps(&self, fds: FuncDepSet) -> Self {
        Self {
            fds,
            ..self.clone()
        }
    }

    pub fn with_col_set(&self, col_ids: Vec<usize>) -> Self {
        Self {
            col_ids,
            ..self.clone()
        }
    }

    pub fn with_class(&self, class: IndexClass) -> Self {
        Self {
            class,
            ..self.clone()
        }
    }

    /// Re-derives row, distinct and null counts from the histogram
    pub fn update_counts(&self) -> Self {
        let (rows, distinct, nulls) = self.histogram.iter().fold((0.0, 0.0, 0.0), |acc, b| {
            (
                acc.0 + b.row_count,
                acc.1 + b.distinct_count,
                acc.2 + b.null_count,
            )
        });
        Self {
            row_count: rows,
            distinct_count: distinct,
            null_count: nulls,
            ..self.clone()
        }
    }

    /// Index columns as a set of table column ids
    pub fn col_set(&self) -> IdSet {
        self.col_ids.iter().copied().collect()
    }

    /// Statistic synthesized without a histogram
    pub fn is_synthetic(&self) -> bool {
        self.histogram.is_empty()
    }

    /// One-line summary for plan traces
    pub fn summary(&self) -> String {
        format!(
            "{} rows={:.1} distinct={:.1} nulls={:.1} buckets={}",
            self.qualifier,
            self.row_count,
            self.distinct_count,
            self.null_count,
            self.histogram.len()
        )
    }
}
