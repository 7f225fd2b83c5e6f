//! Conjunction collector: applies one AND's leaves to one index

use crate::histogram::{self, Bound};
use crate::index_filter::{IndexLeaf, IndexScanOp};
use idxplan_catalog::{FuncDepSet, HistogramBucket, Statistic};
use idxplan_common::{IdSet, Result};
use idxplan_sql::{compare_values, Literal};
use tracing::debug;

/// Walks the leaves of a conjunction in index column order. Columns pinned to
/// a constant extend the matched prefix; the histogram is truncated to the
/// pinned prefix key, or by a range on the first column.
#[derive(Debug)]
pub struct ConjCollector<'a> {
    stat: &'a Statistic,
    columns: Vec<String>,
    start_hist: Vec<HistogramBucket>,
    eq_vals: Vec<Option<Literal>>,
    pub hist: Vec<HistogramBucket>,
    /// First index ordinal not pinned to a constant
    pub missing_prefix: usize,
    /// Ordinals pinned to a constant
    pub constant: IdSet,
    /// Ordinals pinned to NULL
    pub null_cols: IdSet,
    /// Ordinals restricted by a range, a set or an exclusion
    pub ineq_cols: IdSet,
    /// Filter ids this collector accounted for
    pub applied: IdSet,
    /// Two different constants on one column
    pub is_false: bool,
}

impl<'a> ConjCollector<'a> {
    pub fn new(stat: &'a Statistic, hist: Vec<HistogramBucket>, columns: &[String]) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
        Self {
            stat,
            eq_vals: vec![None; columns.len()],
            columns,
            start_hist: hist.clone(),
            hist,
            missing_prefix: 0,
            constant: IdSet::new(),
            null_cols: IdSet::new(),
            ineq_cols: IdSet::new(),
            applied: IdSet::new(),
            is_false: false,
        }
    }

    fn ordinal(&self, leaf: &IndexLeaf) -> Option<usize> {
        let name = leaf.column.norm_name();
        self.columns.iter().position(|c| *c == name)
    }

    /// Accumulates one leaf. Leaves on columns outside the index, spatial
    /// and full-text leaves are ignored.
    pub fn add(&mut self, leaf: &IndexLeaf) -> Result<()> {
        let Some(ord) = self.ordinal(leaf) else {
            return Ok(());
        };
        match leaf.op {
            IndexScanOp::SpatialEq | IndexScanOp::FulltextEq => return Ok(()),
            _ if leaf.is_point() => {
                if let Some(v) = leaf.point_value() {
                    self.add_eq(ord, v);
                }
            }
            IndexScanOp::InSet => self.add_in_set(ord, &leaf.values),
            IndexScanOp::Gt | IndexScanOp::Gte | IndexScanOp::Lt | IndexScanOp::Lte => {
                self.add_range(ord, leaf.op, &leaf.values)
            }
            IndexScanOp::NotEq | IndexScanOp::NotInSet => {
                self.ineq_cols.insert(ord);
                if ord == 0 && !self.constant.contains(0) {
                    let mut hist = std::mem::take(&mut self.hist);
                    for v in &leaf.values {
                        hist = histogram::not_eq(&hist, v);
                    }
                    self.hist = hist;
                }
            }
            IndexScanOp::IsNotNull => {
                self.ineq_cols.insert(ord);
                if ord == 0 && !self.constant.contains(0) {
                    self.hist = histogram::null_filter(&self.hist, false);
                }
            }
            IndexScanOp::Eq | IndexScanOp::NullSafeEq | IndexScanOp::IsNull => {}
        }
        self.applied.insert(leaf.id);
        Ok(())
    }

    fn add_eq(&mut self, ord: usize, value: Literal) {
        if self.constant.contains(ord) {
            let same = self.eq_vals[ord].as_ref().is_some_and(|v| {
                if v.is_null() || value.is_null() {
                    v.is_null() && value.is_null()
                } else {
                    compare_values(v, &value).is_some_and(|o| o.is_eq())
                }
            });
            if !same {
                debug!(column = %self.columns[ord], "conflicting constants, conjunction is false");
                self.is_false = true;
                self.hist.clear();
            }
            return;
        }
        self.constant.insert(ord);
        if value.is_null() {
            self.null_cols.insert(ord);
        }
        self.eq_vals[ord] = Some(value);
        if ord != self.missing_prefix {
            return;
        }
        while self.missing_prefix < self.columns.len() && self.constant.contains(self.missing_prefix)
        {
            self.missing_prefix += 1;
        }
        if self.is_false {
            return;
        }
        let key: Vec<Literal> = self.eq_vals[..self.missing_prefix]
            .iter()
            .flatten()
            .cloned()
            .collect();
        let truncated = histogram::prefix_key(&self.start_hist, &key, self.columns.len());
        self.hist = histogram::cap_rows(truncated, histogram::row_count(&self.hist));
    }

    fn add_in_set(&mut self, ord: usize, values: &[Literal]) {
        self.ineq_cols.insert(ord);
        if ord != self.missing_prefix || self.is_false {
            return;
        }
        let mut key: Vec<Literal> = self.eq_vals[..ord].iter().flatten().cloned().collect();
        let mut union = Vec::new();
        for v in values {
            key.push(v.clone());
            let part = histogram::prefix_key(&self.start_hist, &key, self.columns.len());
            union = histogram::union(&union, &part);
            key.pop();
        }
        self.hist = histogram::cap_rows(union, histogram::row_count(&self.hist));
    }

    fn add_range(&mut self, ord: usize, op: IndexScanOp, values: &[Literal]) {
        self.ineq_cols.insert(ord);
        if ord != 0 || self.constant.contains(0) || self.is_false {
            return;
        }
        let Some(value) = values.first().cloned() else {
            return;
        };
        let (lower, upper) = match op {
            IndexScanOp::Gt => (Some(Bound { value, inclusive: false }), None),
            IndexScanOp::Gte => (Some(Bound { value, inclusive: true }), None),
            IndexScanOp::Lt => (None, Some(Bound { value, inclusive: false })),
            IndexScanOp::Lte => (None, Some(Bound { value, inclusive: true })),
            _ => return,
        };
        self.hist = histogram::range_truncate(&self.hist, lower, upper);
    }

    /// Functional dependencies under the pinned constants. Columns pinned to
    /// NULL do not count: a NULL key column does not make a lookup unique.
    pub fn get_fds(&self) -> FuncDepSet {
        let consts: IdSet = self
            .constant
            .difference(&self.null_cols)
            .iter()
            .filter_map(|ord| self.stat.col_ids.get(ord).copied())
            .collect();
        FuncDepSet::new_lookup_fds(&self.stat.fds, &consts)
    }

    /// A range restricts the first column after the pinned prefix
    pub fn has_range(&self) -> bool {
        self.ineq_cols.contains(self.missing_prefix)
    }
}
