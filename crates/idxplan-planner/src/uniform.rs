//! Statistics fallback for tables without per-index statistics

use idxplan_catalog::{FuncDepSet, IndexDef, StatQualifier, Statistic, TableEntry};
use idxplan_common::{CosterConfig, IdSet, IdxError, Result};

/// Table column ids of an index's columns, in index order
pub fn index_col_ids(table: &TableEntry, index: &IndexDef) -> Result<Vec<usize>> {
    index
        .column_names()
        .iter()
        .map(|name| {
            table.column_id(name).ok_or_else(|| {
                IdxError::Catalog(format!(
                    "index {} references missing column {}.{}",
                    index.id, table.name, name
                ))
            })
        })
        .collect()
}

/// Functional dependencies an index guarantees. A unique index is a strict
/// key when all of its columns are NOT NULL and a lax key otherwise.
pub fn index_fds(table: &TableEntry, index: &IndexDef) -> Result<FuncDepSet> {
    let fields = table.schema.fields();
    let all: IdSet = (0..fields.len()).collect();
    let not_null: IdSet = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.is_nullable())
        .map(|(i, _)| i)
        .collect();
    let key: IdSet = index_col_ids(table, index)?.into_iter().collect();

    let (strict, lax) = if !index.unique {
        (vec![], vec![])
    } else if key.is_subset_of(&not_null) {
        (vec![key], vec![])
    } else {
        (vec![], vec![key])
    };
    Ok(FuncDepSet::new_tablescan_fds(all, not_null, strict, lax))
}

/// Synthetic statistic assuming uniformly distributed values
pub fn uniform_dist_statistic(
    table: &TableEntry,
    index: &IndexDef,
    row_count: u64,
    avg_size: u64,
    config: &CosterConfig,
) -> Result<Statistic> {
    let rows = row_count as f64;
    let distinct = if index.unique {
        rows
    } else {
        rows * config.uniform_distinct_ratio
    };
    let nulls = distinct * config.uniform_null_ratio;

    let qualifier = StatQualifier::new(&table.database, &table.database, &table.name, &index.id);
    Ok(Statistic::new(qualifier, index.column_names(), index.column_types())
        .with_row_count(rows)
        .with_distinct_count(distinct)
        .with_null_count(nulls)
        .with_avg_size(avg_size)
        .with_col_set(index_col_ids(table, index)?)
        .with_func_deps(index_fds(table, index)?)
        .with_class(index.class))
}
