//! Costed index scan: picks the best index for one table's filter and builds
//! the indexed access that replaces the table scan

use crate::coster::IndexCoster;
use crate::flatten::Flattener;
use crate::index_filter::{format_index_filter, IndexScanOp};
use crate::range_builder::RangeBuilder;
use crate::uniform::{index_col_ids, uniform_dist_statistic};
use idxplan_catalog::{IndexDef, Statistic, StatsProvider, TableEntry};
use idxplan_common::{CosterConfig, Result};
use idxplan_sql::expr::{join_and, split_conjunction};
use idxplan_sql::{Expr, IndexLookup, LogicalPlan, LookupPayload, RangeCollection};
use tracing::{debug, info, warn};

/// Outcome of a successful costed index scan
#[derive(Debug, Clone)]
pub struct CostedIndexScanResult {
    /// `IndexedTableAccess` node replacing the table scan
    pub access: LogicalPlan,
    pub lookup: IndexLookup,
    pub index_id: String,
    /// Predicates still to be checked on the rows the lookup returns
    pub residual: Option<Expr>,
    /// Statistic of the chosen index, narrowed to the filter
    pub stat: Statistic,
    /// The lookup returns at most one row
    pub max1_row: bool,
    /// The filter can never be true. The lookup is empty and the residual is
    /// the whole filter; replacing the scan is left to the caller.
    pub is_false: bool,
    pub trace: Vec<String>,
}

/// Costs every index of `table` against `filter`. Returns `None` when no
/// index beats a full table scan.
pub fn costed_index_scan(
    provider: &dyn StatsProvider,
    table: &TableEntry,
    filter: &Expr,
    config: &CosterConfig,
) -> Result<Option<CostedIndexScanResult>> {
    if !config.enabled {
        return Ok(None);
    }

    let mut indexes: Vec<&IndexDef> = table.indexes.iter().filter(|i| !i.is_vector()).collect();
    indexes.sort_by(|a, b| a.id.cmp(&b.id));
    if config.max_index_candidates > 0 {
        indexes.truncate(config.max_index_candidates);
    }
    if indexes.is_empty() {
        return Ok(None);
    }

    let mut flattener = Flattener::new();
    let flat = flattener.flatten(filter);
    let Some(root) = flat.root else {
        debug!(table = %table.name, "filter has no indexable predicates");
        return Ok(None);
    };
    let mut trace = vec![format!("index filter:\n{}", format_index_filter(&root))];

    let stats = index_statistics(provider, table, &indexes, config)?;
    let mut coster = IndexCoster::new(&root, config);
    for (index, stat) in indexes.iter().zip(&stats) {
        coster.cost(&root, stat, index)?;
    }
    let Some(best) = coster.into_best() else {
        debug!(table = %table.name, "no index covers the filter");
        return Ok(None);
    };
    let index = &best.index;
    trace.push(format!("best index: {} rows={:.1}", index.id, best.row_count));

    if best.is_false {
        info!(table = %table.name, index = %index.id, "filter is unsatisfiable");
        let lookup = IndexLookup {
            index_id: index.id.clone(),
            payload: LookupPayload::Ranges(RangeCollection::default()),
            is_empty: true,
            is_spatial: index.is_spatial(),
        };
        trace.push("filter is unsatisfiable".to_string());
        return Ok(Some(CostedIndexScanResult {
            access: indexed_access(table, &lookup),
            index_id: index.id.clone(),
            lookup,
            residual: Some(filter.clone()),
            stat: best.stat.with_histogram(vec![]).update_counts(),
            max1_row: false,
            is_false: true,
            trace,
        }));
    }

    let arena = flattener.into_arena();
    let mut builder = RangeBuilder::new(&arena, index, &best.filters, &flat.imprecise);
    let ranges = match builder.build_range_collection(&root) {
        Ok(ranges) => ranges,
        Err(e) if e.is_recoverable() => {
            warn!(table = %table.name, index = %index.id, error = %e, "abandoning index scan");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    trace.push(format!("ranges: {ranges}"));

    // a full-text lookup is driven by its MATCH expression; its range only
    // selects the index
    if !index.is_fulltext() && (ranges.is_empty() || ranges.is_full_table()) {
        debug!(index = %index.id, "ranges do not restrict the scan");
        return Ok(None);
    }
    if index.is_spatial() && ranges.len() > 1 {
        debug!(index = %index.id, "spatial lookup over disjoint ranges");
        return Ok(None);
    }

    let payload = if index.is_fulltext() {
        let matched = root
            .leaves()
            .into_iter()
            .find(|l| l.op == IndexScanOp::FulltextEq && best.filters.contains(l.id));
        match matched {
            Some(leaf) => LookupPayload::FullText(arena.get(leaf.id)?.clone()),
            None => return Ok(None),
        }
    } else {
        LookupPayload::Ranges(ranges.clone())
    };

    let keeps_all_filters =
        index.has_prefix_lengths() || index.is_spatial() || index.is_fulltext() || !table.precise_match;
    let residual = if keeps_all_filters {
        Some(filter.clone())
    } else {
        let mut leftover = builder.leftover_exprs();
        if let Some(rest) = &flat.leftover {
            leftover.extend(split_conjunction(rest));
        }
        join_and(leftover)
    };

    let max1_row = best.fds.has_max1_row() && ranges.len() == 1;
    let stat = if max1_row {
        best.stat.with_row_count(1.0).with_distinct_count(1.0)
    } else if !best.hist.is_empty() {
        best.stat.with_histogram(best.hist.clone()).update_counts()
    } else {
        best.stat.clone()
    };
    trace.push(format!("stat: {}", stat.summary()));
    if let Some(r) = &residual {
        trace.push(format!("residual: {r}"));
    }
    for line in &trace {
        debug!(table = %table.name, "{line}");
    }
    info!(
        table = %table.name,
        index = %index.id,
        rows = stat.row_count,
        max1_row,
        "chose index scan"
    );

    let lookup = IndexLookup {
        index_id: index.id.clone(),
        payload,
        is_empty: false,
        is_spatial: index.is_spatial(),
    };
    Ok(Some(CostedIndexScanResult {
        access: indexed_access(table, &lookup),
        index_id: index.id.clone(),
        lookup,
        residual,
        stat,
        max1_row,
        is_false: false,
        trace,
    }))
}

fn indexed_access(table: &TableEntry, lookup: &IndexLookup) -> LogicalPlan {
    LogicalPlan::IndexedTableAccess {
        database: table.database.clone(),
        table_name: table.name.clone(),
        schema: table.schema.clone(),
        index_id: lookup.index_id.clone(),
        lookup: lookup.clone(),
    }
}

/// One statistic per index, in index order. Real statistics are used only
/// when every index has one; otherwise every index gets the uniform fallback.
/// Real statistics keep their own dependencies and column set.
fn index_statistics(
    provider: &dyn StatsProvider,
    table: &TableEntry,
    indexes: &[&IndexDef],
    config: &CosterConfig,
) -> Result<Vec<Statistic>> {
    let recorded = provider.get_table_stats(&table.database, &table.name)?;
    let real: Option<Vec<Statistic>> = indexes
        .iter()
        .map(|index| {
            let id = index.id.to_lowercase();
            recorded
                .iter()
                .filter(|s| s.qualifier.index == id)
                .max_by_key(|s| s.columns.len())
                .cloned()
        })
        .collect();

    match real {
        Some(stats) => indexes
            .iter()
            .zip(stats)
            .map(|(index, stat)| {
                let stat = if stat.col_ids.is_empty() {
                    stat.with_col_set(index_col_ids(table, index)?)
                } else {
                    stat
                };
                Ok(stat.with_class(index.class))
            })
            .collect(),
        None => {
            let rows = provider.row_count(&table.database, &table.name)?;
            let length = provider.data_length(&table.database, &table.name)?;
            let avg_size = if rows > 0 { length / rows } else { 0 };
            debug!(table = %table.name, rows, "using uniform statistics");
            indexes
                .iter()
                .map(|index| uniform_dist_statistic(table, index, rows, avg_size, config))
                .collect()
        }
    }
}
