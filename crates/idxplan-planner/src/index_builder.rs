//! Per-column interval assembly for one index

use crate::index_filter::{IndexLeaf, IndexScanOp};
use arrow_schema::DataType;
use idxplan_catalog::IndexDef;
use idxplan_common::{IdxError, Result};
use idxplan_sql::{Geometry, Literal, Range, RangeColumnExpr, RangeCut};

/// Collects the leaves of one conjunction as interval lists, one list per
/// index column, then expands them into ranges.
#[derive(Debug, Clone)]
pub struct IndexRangeBuilder<'a> {
    index: &'a IndexDef,
    types: Vec<DataType>,
    columns: Vec<Vec<RangeColumnExpr>>,
}

impl<'a> IndexRangeBuilder<'a> {
    pub fn new(index: &'a IndexDef) -> Self {
        let types = index.column_types();
        let columns = types
            .iter()
            .map(|t| vec![RangeColumnExpr::full(t.clone())])
            .collect();
        Self {
            index,
            types,
            columns,
        }
    }

    /// Narrows the leaf's column by the leaf's intervals
    pub fn add_leaf(&mut self, leaf: &IndexLeaf) -> Result<()> {
        let ord = self.index.ordinal_of(&leaf.column.name).ok_or_else(|| {
            IdxError::Internal(format!(
                "column {} is not part of index {}",
                leaf.column, self.index.id
            ))
        })?;
        let intervals = leaf_intervals(leaf, &self.types[ord])?;
        self.columns[ord] = intersect_lists(&self.columns[ord], &intervals);
        Ok(())
    }

    /// Cartesian product of the per-column lists
    pub fn build(&self) -> Vec<Range> {
        let mut ranges: Vec<Vec<RangeColumnExpr>> = vec![vec![]];
        for list in &self.columns {
            let mut next = Vec::with_capacity(ranges.len() * list.len());
            for prefix in &ranges {
                for interval in list {
                    let mut r = prefix.clone();
                    r.push(interval.clone());
                    next.push(r);
                }
            }
            ranges = next;
        }
        ranges.into_iter().map(Range::new).collect()
    }
}

fn leaf_intervals(leaf: &IndexLeaf, dt: &DataType) -> Result<Vec<RangeColumnExpr>> {
    let values = match leaf.op {
        IndexScanOp::SpatialEq | IndexScanOp::FulltextEq => vec![],
        _ => leaf
            .values
            .iter()
            .map(|v| v.coerce_to(dt))
            .collect::<Result<Vec<_>>>()?,
    };
    let first = || {
        values.first().cloned().ok_or_else(|| {
            IdxError::Internal(format!("leaf {} has no operand", leaf.id))
        })
    };
    let dt = dt.clone();
    let out = match leaf.op {
        IndexScanOp::Eq | IndexScanOp::NullSafeEq => vec![RangeColumnExpr::point(first()?, dt)],
        IndexScanOp::InSet => values
            .iter()
            .map(|v| RangeColumnExpr::point(v.clone(), dt.clone()))
            .collect(),
        IndexScanOp::NotEq | IndexScanOp::NotInSet => complement(&values, dt),
        IndexScanOp::Gt => vec![RangeColumnExpr::new(RangeCut::Above(first()?), RangeCut::AboveAll, dt)],
        IndexScanOp::Gte => vec![RangeColumnExpr::new(RangeCut::Below(first()?), RangeCut::AboveAll, dt)],
        IndexScanOp::Lt => vec![RangeColumnExpr::new(RangeCut::AboveNull, RangeCut::Below(first()?), dt)],
        IndexScanOp::Lte => vec![RangeColumnExpr::new(RangeCut::AboveNull, RangeCut::Above(first()?), dt)],
        IndexScanOp::IsNull => vec![RangeColumnExpr::null_point(dt)],
        IndexScanOp::IsNotNull => vec![RangeColumnExpr::not_null(dt)],
        IndexScanOp::SpatialEq => vec![spatial_interval(leaf, dt)?],
        IndexScanOp::FulltextEq => vec![RangeColumnExpr::full(dt)],
    };
    Ok(out)
}

/// Everything but NULL and the given values
fn complement(values: &[Literal], dt: DataType) -> Vec<RangeColumnExpr> {
    let mut sorted: Vec<&Literal> = values.iter().filter(|v| !v.is_null()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup_by(|a, b| a.total_cmp(b).is_eq());

    let mut out = Vec::with_capacity(sorted.len() + 1);
    let mut lower = RangeCut::AboveNull;
    for v in sorted {
        let interval = RangeColumnExpr::new(lower, RangeCut::Below(v.clone()), dt.clone());
        if !interval.is_empty() {
            out.push(interval);
        }
        lower = RangeCut::Above(v.clone());
    }
    out.push(RangeColumnExpr::new(lower, RangeCut::AboveAll, dt));
    out
}

/// Bounding box of the operand as a closed interval between its corners
fn spatial_interval(leaf: &IndexLeaf, dt: DataType) -> Result<RangeColumnExpr> {
    let geometry = match leaf.values.first() {
        Some(Literal::Geometry(g)) => g,
        other => {
            return Err(IdxError::InvalidGisData(format!(
                "spatial operand {} is not a geometry",
                other.map(|v| v.to_string()).unwrap_or_default()
            )))
        }
    };
    let (min_x, min_y, max_x, max_y) = geometry
        .bbox()
        .ok_or_else(|| IdxError::InvalidGisData(format!("empty geometry {geometry}")))?;
    Ok(RangeColumnExpr::new(
        RangeCut::Below(Literal::Geometry(Geometry::point(min_x, min_y))),
        RangeCut::Above(Literal::Geometry(Geometry::point(max_x, max_y))),
        dt,
    ))
}

/// Pairwise intersection of two sorted, disjoint interval lists
fn intersect_lists(a: &[RangeColumnExpr], b: &[RangeColumnExpr]) -> Vec<RangeColumnExpr> {
    let mut out: Vec<RangeColumnExpr> = a
        .iter()
        .flat_map(|x| b.iter().filter_map(move |y| x.intersect(y)))
        .collect();
    out.sort_by(|x, y| x.lower.cmp(&y.lower).then_with(|| x.upper.cmp(&y.upper)));
    let mut merged: Vec<RangeColumnExpr> = Vec::with_capacity(out.len());
    for interval in out {
        if let Some(last) = merged.last_mut() {
            if let Some(u) = last.try_union(&interval) {
                *last = u;
                continue;
            }
        }
        merged.push(interval);
    }
    merged
}
