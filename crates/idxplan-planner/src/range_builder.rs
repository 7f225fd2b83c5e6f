//! Range reconstruction from the winning candidate

use crate::index_builder::IndexRangeBuilder;
use crate::index_filter::{AndNode, ExprArena, ExprId, IndexFilter, IndexLeaf, IndexScanOp, OrChild, OrNode};
use idxplan_catalog::IndexDef;
use idxplan_common::{IdSet, Result};
use idxplan_sql::{Expr, Range, RangeCollection};

/// Builds the range collection of one index from the filter ids the coster
/// marked as covered. Predicates the ranges do not fully answer are pushed to
/// `leftover`.
pub struct RangeBuilder<'a> {
    arena: &'a ExprArena,
    index: &'a IndexDef,
    covered: &'a IdSet,
    imprecise: &'a IdSet,
    pub leftover: Vec<(ExprId, Expr)>,
}

impl<'a> RangeBuilder<'a> {
    pub fn new(
        arena: &'a ExprArena,
        index: &'a IndexDef,
        covered: &'a IdSet,
        imprecise: &'a IdSet,
    ) -> Self {
        Self {
            arena,
            index,
            covered,
            imprecise,
            leftover: vec![],
        }
    }

    pub fn build_range_collection(&mut self, filter: &IndexFilter) -> Result<RangeCollection> {
        let ranges = match filter {
            IndexFilter::Leaf(leaf) => self.leaf_ranges(leaf)?,
            IndexFilter::And(and) => self.and_ranges(and)?,
            IndexFilter::Or(or) => self.or_ranges(or)?,
        };
        Ok(ranges.remove_overlaps())
    }

    /// Leftover predicates in id order, without duplicates
    pub fn leftover_exprs(&self) -> Vec<Expr> {
        let mut leftover = self.leftover.clone();
        leftover.sort_by_key(|(id, _)| *id);
        leftover.dedup_by_key(|(id, _)| *id);
        leftover.into_iter().map(|(_, e)| e).collect()
    }

    fn full(&self) -> RangeCollection {
        RangeCollection::new(vec![Range::full(&self.index.column_types())])
    }

    fn push_leftover(&mut self, id: ExprId) -> Result<()> {
        let expr = self.arena.get(id)?.clone();
        self.leftover.push((id, expr));
        Ok(())
    }

    /// Spatial, full-text and imprecise leaves narrow the scan but are
    /// re-checked afterwards
    fn needs_recheck(&self, leaf: &IndexLeaf) -> bool {
        self.imprecise.contains(leaf.id)
            || matches!(leaf.op, IndexScanOp::SpatialEq | IndexScanOp::FulltextEq)
    }

    fn leaf_ranges(&mut self, leaf: &IndexLeaf) -> Result<RangeCollection> {
        if !self.covered.contains(leaf.id) {
            self.push_leftover(leaf.id)?;
            return Ok(self.full());
        }
        let mut builder = IndexRangeBuilder::new(self.index);
        builder.add_leaf(leaf)?;
        if self.needs_recheck(leaf) {
            self.push_leftover(leaf.id)?;
        }
        Ok(RangeCollection::new(builder.build()))
    }

    fn and_ranges(&mut self, and: &AndNode) -> Result<RangeCollection> {
        let mut builder = IndexRangeBuilder::new(self.index);
        for leaf in and.all_leaves() {
            if !self.covered.contains(leaf.id) {
                self.push_leftover(leaf.id)?;
                continue;
            }
            builder.add_leaf(leaf)?;
            if self.needs_recheck(leaf) {
                self.push_leftover(leaf.id)?;
            }
        }
        let mut ranges = RangeCollection::new(builder.build());
        for or in &and.or_children {
            if !self.covered.contains(or.id) {
                self.push_leftover(or.id)?;
                continue;
            }
            let or_ranges = self.or_ranges(or)?;
            ranges = ranges.intersect(&or_ranges);
        }
        Ok(ranges)
    }

    /// Union of the children. A child that leaves anything behind makes the
    /// whole disjunction a leftover; re-checking part of an OR in the outer
    /// conjunction would drop rows.
    fn or_ranges(&mut self, or: &OrNode) -> Result<RangeCollection> {
        if !self.covered.contains(or.id) {
            self.push_leftover(or.id)?;
            return Ok(self.full());
        }
        let mut nested = RangeBuilder::new(self.arena, self.index, self.covered, self.imprecise);
        let mut ranges = RangeCollection::default();
        for child in &or.children {
            let child_ranges = match child {
                OrChild::Leaf(leaf) => nested.leaf_ranges(leaf)?,
                OrChild::And(and) => nested.and_ranges(and)?,
            };
            ranges = ranges.union(&child_ranges);
        }
        if !nested.leftover.is_empty() {
            self.push_leftover(or.id)?;
        }
        Ok(ranges)
    }
}
