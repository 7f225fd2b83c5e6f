//! Index coster: costs every candidate index against one filter tree and
//! keeps the best

use crate::conj::ConjCollector;
use crate::histogram;
use crate::index_filter::{
    subtree_ids, AndNode, ExprId, IndexFilter, IndexLeaf, IndexScanOp, OrChild, OrNode,
};
use idxplan_catalog::{FuncDepSet, HistogramBucket, IndexDef, Statistic};
use idxplan_common::{CosterConfig, IdSet, Result};
use idxplan_sql::Literal;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// Candidates
// ============================================================================

/// Best index found so far
#[derive(Debug, Clone)]
pub struct BestCandidate {
    pub index: IndexDef,
    pub stat: Statistic,
    pub hist: Vec<HistogramBucket>,
    pub row_count: f64,
    /// Filter ids the index accounts for
    pub filters: IdSet,
    /// Leading index columns pinned to constants
    pub prefix: usize,
    /// A range restricts the column after the prefix
    pub has_range: bool,
    pub is_false: bool,
    pub fds: FuncDepSet,
    eq_filters: usize,
    null_filters: usize,
}

/// Outcome of costing one node against one index
#[derive(Debug, Clone)]
struct NodeCost {
    hist: Vec<HistogramBucket>,
    filters: IdSet,
    prefix: usize,
    has_range: bool,
    is_false: bool,
    fds: FuncDepSet,
}

/// Costs filter trees against indexes. One coster serves one flattened
/// filter; call [`IndexCoster::cost`] once per index, then read
/// [`IndexCoster::best`].
pub struct IndexCoster<'a> {
    config: &'a CosterConfig,
    /// Operator and operand count per leaf id
    ops: HashMap<ExprId, (IndexScanOp, usize)>,
    best: Option<BestCandidate>,
}

impl<'a> IndexCoster<'a> {
    pub fn new(root: &IndexFilter, config: &'a CosterConfig) -> Self {
        let ops = root
            .leaves()
            .into_iter()
            .map(|l| (l.id, (l.op, l.values.len())))
            .collect();
        Self {
            config,
            ops,
            best: None,
        }
    }

    pub fn best(&self) -> Option<&BestCandidate> {
        self.best.as_ref()
    }

    pub fn into_best(self) -> Option<BestCandidate> {
        self.best
    }

    /// Costs `filter` against `index` and records the result if it beats the
    /// current best
    pub fn cost(&mut self, filter: &IndexFilter, stat: &Statistic, index: &IndexDef) -> Result<()> {
        if index.is_vector() {
            return Ok(());
        }
        let result = match filter {
            IndexFilter::Leaf(leaf) => self.cost_leaf(leaf, stat, index)?,
            IndexFilter::And(and) => self.cost_and(and, stat, index)?,
            IndexFilter::Or(or) => self.cost_or(or, stat, index)?,
        };
        let Some(result) = result else {
            debug!(index = %index.id, "index does not apply");
            return Ok(());
        };
        if result.filters.is_empty() {
            return Ok(());
        }

        let (eq_filters, null_filters) = self.const_and_null_filters(&result.filters);
        let row_count = if result.is_false {
            0.0
        } else {
            histogram::row_count(&result.hist)
        };
        debug!(
            index = %index.id,
            rows = row_count,
            prefix = result.prefix,
            filters = %result.filters,
            "costed index"
        );
        let candidate = BestCandidate {
            index: index.clone(),
            stat: stat.clone(),
            hist: result.hist,
            row_count,
            filters: result.filters,
            prefix: result.prefix,
            has_range: result.has_range,
            is_false: result.is_false,
            fds: result.fds,
            eq_filters,
            null_filters,
        };
        self.update_best(candidate);
        Ok(())
    }

    fn update_best(&mut self, candidate: BestCandidate) {
        let replace = match &self.best {
            None => true,
            Some(best) => compare_candidates(&candidate, best, self.config).is_gt(),
        };
        if replace {
            self.best = Some(candidate);
        }
    }

    /// Counts covered equality filters and covered null tests
    fn const_and_null_filters(&self, filters: &IdSet) -> (usize, usize) {
        let mut eq = 0;
        let mut null = 0;
        for id in filters.iter() {
            match self.ops.get(&id) {
                Some((IndexScanOp::Eq, _)) => eq += 1,
                Some((IndexScanOp::InSet, 1)) => eq += 1,
                Some((IndexScanOp::NullSafeEq, _)) => {
                    eq += 1;
                    null += 1;
                }
                Some((IndexScanOp::IsNull, _)) => null += 1,
                _ => {}
            }
        }
        (eq, null)
    }

    // ========================================================================
    // Per-node costing
    // ========================================================================

    fn cost_leaf(&self, leaf: &IndexLeaf, stat: &Statistic, index: &IndexDef) -> Result<Option<NodeCost>> {
        match leaf.op {
            IndexScanOp::SpatialEq => return Ok(self.cost_spatial(leaf, stat, index)),
            IndexScanOp::FulltextEq => return Ok(self.cost_fulltext(leaf, stat, index)),
            _ => {}
        }
        if index.is_spatial() || index.is_fulltext() {
            return Ok(None);
        }
        let Some(ord) = index.ordinal_of(&leaf.column.name) else {
            return Ok(None);
        };
        if index.is_content_hashed(ord) && !leaf.op.allowed_on_hashed_column() {
            return Ok(None);
        }
        let mut conj = ConjCollector::new(stat, stat.histogram.clone(), &index.column_names());
        conj.add(leaf)?;
        Ok(Some(conj_cost(&conj, index)))
    }

    fn cost_spatial(&self, leaf: &IndexLeaf, stat: &Statistic, index: &IndexDef) -> Option<NodeCost> {
        if !index.is_spatial() || index.ordinal_of(&leaf.column.name) != Some(0) {
            return None;
        }
        if !matches!(leaf.values.first(), Some(Literal::Geometry(_))) {
            return None;
        }
        Some(single_leaf_cost(leaf.id, stat, true))
    }

    fn cost_fulltext(&self, leaf: &IndexLeaf, stat: &Statistic, index: &IndexDef) -> Option<NodeCost> {
        if !index.is_fulltext() {
            return None;
        }
        let matches = match &leaf.fulltext_index {
            Some(name) => name.eq_ignore_ascii_case(&index.id),
            None => index.ordinal_of(&leaf.column.name).is_some(),
        };
        matches.then(|| single_leaf_cost(leaf.id, stat, false))
    }

    fn cost_and(&self, and: &AndNode, stat: &Statistic, index: &IndexDef) -> Result<Option<NodeCost>> {
        // a spatial or full-text match on this index wins the whole conjunction
        for leaf in and.all_leaves() {
            if matches!(leaf.op, IndexScanOp::SpatialEq | IndexScanOp::FulltextEq) {
                if let Some(cost) = self.cost_leaf(leaf, stat, index)? {
                    return Ok(Some(cost));
                }
            }
        }

        let mut hist = stat.histogram.clone();
        let mut filters = IdSet::new();
        let mut ors_applied = false;
        for or in &and.or_children {
            let Some(cost) = self.cost_or(or, stat, index)? else {
                continue;
            };
            hist = if ors_applied {
                histogram::intersect(&hist, &cost.hist)
            } else {
                cost.hist
            };
            filters = filters.union(&cost.filters);
            ors_applied = true;
        }

        let columns = index.column_names();
        let mut conj = ConjCollector::new(stat, hist, &columns);
        if !(index.is_spatial() || index.is_fulltext()) {
            for (ord, column) in columns.iter().enumerate() {
                let Some(leaves) = and.leaves.get(column) else {
                    continue;
                };
                let mut leaves: Vec<&IndexLeaf> = leaves.iter().collect();
                // constants first so a later range sees the pinned column
                leaves.sort_by_key(|l| (!l.is_point(), l.id));
                for leaf in leaves {
                    if index.is_content_hashed(ord) && !leaf.op.allowed_on_hashed_column() {
                        continue;
                    }
                    conj.add(leaf)?;
                }
            }
        }

        let mut cost = conj_cost(&conj, index);
        cost.filters = cost.filters.union(&filters);
        if cost.filters.is_empty() {
            return Ok(None);
        }
        Ok(Some(cost))
    }

    /// Every child must resolve against the index, and an AND child must use
    /// all of its own predicates
    fn cost_or(&self, or: &OrNode, stat: &Statistic, index: &IndexDef) -> Result<Option<NodeCost>> {
        let mut hist: Vec<HistogramBucket> = Vec::new();
        let mut filters = IdSet::singleton(or.id);
        let mut prefix = usize::MAX;
        let mut is_false = true;
        for child in &or.children {
            let cost = match child {
                OrChild::Leaf(leaf) => self.cost_leaf(leaf, stat, index)?,
                OrChild::And(and) => match self.cost_and(and, stat, index)? {
                    Some(mut cost) => {
                        cost.filters.insert(and.id);
                        let needed = subtree_ids(child);
                        if !needed.is_subset_of(&cost.filters) {
                            return Ok(None);
                        }
                        Some(cost)
                    }
                    None => None,
                },
            };
            let Some(cost) = cost else {
                return Ok(None);
            };
            if !cost.filters.contains(child.id()) {
                return Ok(None);
            }
            hist = histogram::union(&hist, &cost.hist);
            filters = filters.union(&cost.filters);
            prefix = prefix.min(cost.prefix);
            is_false &= cost.is_false;
        }
        if or.children.is_empty() {
            return Ok(None);
        }
        Ok(Some(NodeCost {
            hist,
            filters,
            prefix,
            has_range: false,
            is_false,
            fds: FuncDepSet::new_lookup_fds(&stat.fds, &IdSet::new()),
        }))
    }
}

/// Pinned constants only become dependencies on a unique index
fn conj_cost(conj: &ConjCollector<'_>, index: &IndexDef) -> NodeCost {
    let fds = if index.unique {
        conj.get_fds()
    } else {
        FuncDepSet::default()
    };
    NodeCost {
        hist: conj.hist.clone(),
        filters: conj.applied.clone(),
        prefix: conj.missing_prefix,
        has_range: conj.has_range(),
        is_false: conj.is_false,
        fds,
    }
}

fn single_leaf_cost(id: ExprId, stat: &Statistic, has_range: bool) -> NodeCost {
    NodeCost {
        hist: stat.histogram.clone(),
        filters: IdSet::singleton(id),
        prefix: 0,
        has_range,
        is_false: false,
        fds: FuncDepSet::new_lookup_fds(&stat.fds, &IdSet::new()),
    }
}

// ============================================================================
// Tie-break order
// ============================================================================

/// Compares two candidates. `Greater` means `candidate` is the better one.
/// Rules apply in order; the first that distinguishes decides:
///
/// 1. fewer estimated rows
/// 2. longer constant prefix
/// 3. same prefix over the same leading columns: a trailing range
/// 4. a strict key over none, then the shorter strict key
/// 5. more constant columns, except that a lax key beats extra constants
/// 6. more covered filters
/// 7. fewer index columns left unexplained by covered filters
/// 8. more equality filters, then more null filters
/// 9. the primary index
/// 10. the lexically smaller index id
pub fn compare_candidates(
    candidate: &BestCandidate,
    best: &BestCandidate,
    config: &CosterConfig,
) -> Ordering {
    // (1) rows
    let rows = best.row_count.total_cmp(&candidate.row_count);
    if rows.is_ne() {
        return rows;
    }

    // (2) prefix
    let prefix = candidate.prefix.cmp(&best.prefix);
    if prefix.is_ne() {
        return prefix;
    }

    // (3) trailing range over the same prefix columns
    let same_leading = {
        let a = candidate.index.column_names();
        let b = best.index.column_names();
        let n = candidate.prefix;
        a.len() >= n && b.len() >= n && a[..n] == b[..n]
    };
    if same_leading {
        let range = candidate.has_range.cmp(&best.has_range);
        if range.is_ne() {
            return range;
        }
    }

    // (4) strict keys
    match (candidate.fds.strict_key(), best.fds.strict_key()) {
        (Some(_), None) => return Ordering::Greater,
        (None, Some(_)) => return Ordering::Less,
        (Some(a), Some(b)) => {
            let shorter = b.len().cmp(&a.len());
            if shorter.is_ne() {
                return shorter;
            }
        }
        (None, None) => {}
    }

    // (5) constants, with the lax key exception
    let consts = candidate
        .fds
        .constants()
        .len()
        .cmp(&best.fds.constants().len());
    if consts.is_ne() {
        let lax = (candidate.fds.lax_key().is_some(), best.fds.lax_key().is_some());
        return match (consts, lax) {
            (Ordering::Less, (true, false)) => Ordering::Greater,
            (Ordering::Greater, (false, true)) => Ordering::Less,
            _ => consts,
        };
    }

    // (6) covered filters
    let filters = candidate.filters.len().cmp(&best.filters.len());
    if filters.is_ne() {
        return filters;
    }

    // (7) unexplained index columns
    let unexplained = |c: &BestCandidate| c.index.columns.len() as i64 - c.filters.len() as i64;
    let narrow = unexplained(best).cmp(&unexplained(candidate));
    if narrow.is_ne() {
        return narrow;
    }

    // (8) equality, then null filters
    let eq = candidate
        .eq_filters
        .cmp(&best.eq_filters)
        .then(candidate.null_filters.cmp(&best.null_filters));
    if eq.is_ne() {
        return eq;
    }

    // (9) primary
    let is_primary = |c: &BestCandidate| c.index.id.eq_ignore_ascii_case(&config.primary_index_name);
    let primary = is_primary(candidate).cmp(&is_primary(best));
    if primary.is_ne() {
        return primary;
    }

    // (10) lexical id
    best.index.id.cmp(&candidate.index.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::Flattener;
    use arrow_schema::DataType;
    use idxplan_catalog::{IndexColumn, StatQualifier};
    use idxplan_sql::expr::{and, binary, col, lit, or};
    use idxplan_sql::{BinaryOperator, Expr};

    fn int_index(id: &str, cols: &[&str]) -> IndexDef {
        IndexDef::new(
            id,
            "db",
            "t",
            cols.iter().map(|c| IndexColumn::new(*c, DataType::Int64)).collect(),
        )
    }

    fn empty_stat(index: &IndexDef, col_ids: Vec<usize>) -> Statistic {
        Statistic::new(
            StatQualifier::new("db", "db", "t", &index.id),
            index.column_names(),
            index.column_types(),
        )
        .with_col_set(col_ids)
    }

    fn eq(c: &str, v: i64) -> Expr {
        binary(col(c, DataType::Int64), BinaryOperator::Eq, lit(v))
    }

    fn best_for(expr: &Expr, indexes: &[(IndexDef, Statistic)]) -> Option<BestCandidate> {
        let config = CosterConfig::default();
        let root = Flattener::new().flatten(expr).root?;
        let mut coster = IndexCoster::new(&root, &config);
        for (idx, stat) in indexes {
            coster.cost(&root, stat, idx).unwrap();
        }
        coster.into_best()
    }

    #[test]
    fn test_longer_prefix_wins() {
        let a = int_index("a_idx", &["a"]);
        let ab = int_index("ab_idx", &["a", "b"]);
        let expr = and(eq("a", 1), eq("b", 2));
        let best = best_for(
            &expr,
            &[(a.clone(), empty_stat(&a, vec![0])), (ab.clone(), empty_stat(&ab, vec![0, 1]))],
        )
        .unwrap();
        assert_eq!(best.index.id, "ab_idx");
        assert_eq!(best.prefix, 2);
    }

    #[test]
    fn test_or_needs_every_child() {
        let a = int_index("a_idx", &["a"]);
        let expr = or(eq("a", 1), eq("c", 3));
        assert!(best_for(&expr, &[(a.clone(), empty_stat(&a, vec![0]))]).is_none());

        let expr = or(eq("a", 1), eq("a", 2));
        let best = best_for(&expr, &[(a.clone(), empty_stat(&a, vec![0]))]).unwrap();
        assert_eq!(best.filters.len(), 3);
    }

    #[test]
    fn test_or_and_child_must_apply_fully() {
        let a = int_index("a_idx", &["a"]);
        let expr = or(and(eq("a", 1), eq("b", 2)), eq("a", 3));
        assert!(best_for(&expr, &[(a.clone(), empty_stat(&a, vec![0]))]).is_none());
    }

    #[test]
    fn test_content_hashed_column_rejects_ranges() {
        let idx = IndexDef::new("u_name", "db", "t", vec![IndexColumn::new("name", DataType::Utf8)])
            .with_unique(true);
        let stat = empty_stat(&idx, vec![0]);
        let gt = binary(col("name", DataType::Utf8), BinaryOperator::Gt, lit("m"));
        assert!(best_for(&gt, &[(idx.clone(), stat.clone())]).is_none());
        let conj = and(gt, binary(col("name", DataType::Utf8), BinaryOperator::Eq, lit("x")));
        let best = best_for(&conj, &[(idx, stat)]).unwrap();
        assert_eq!(best.filters.len(), 1);
    }

    #[test]
    fn test_constants_only_pinned_on_unique_index() {
        let a = int_index("a_idx", &["a"]);
        let best = best_for(&eq("a", 1), &[(a.clone(), empty_stat(&a, vec![0]))]).unwrap();
        assert!(best.fds.constants().is_empty());

        let u = int_index("u_a", &["a"]).with_unique(true);
        let best = best_for(&eq("a", 1), &[(u.clone(), empty_stat(&u, vec![0]))]).unwrap();
        assert_eq!(best.fds.constants(), &IdSet::singleton(0));
    }

    #[test]
    fn test_prefix_length_unhashes_only_its_column() {
        let idx = IndexDef::new(
            "u_name_tag",
            "db",
            "t",
            vec![
                IndexColumn::new("name", DataType::Utf8),
                IndexColumn::new("tag", DataType::Utf8),
            ],
        )
        .with_unique(true)
        .with_prefix_lengths(vec![8, 0]);
        let stat = empty_stat(&idx, vec![0, 1]);
        let gt = binary(col("name", DataType::Utf8), BinaryOperator::Gt, lit("m"));
        assert!(best_for(&gt, &[(idx.clone(), stat.clone())]).is_some());

        let conj = and(
            binary(col("name", DataType::Utf8), BinaryOperator::Eq, lit("x")),
            binary(col("tag", DataType::Utf8), BinaryOperator::Gt, lit("m")),
        );
        let best = best_for(&conj, &[(idx, stat)]).unwrap();
        assert_eq!(best.filters.len(), 1);
        assert!(!best.has_range);
    }

    #[test]
    fn test_primary_then_lexical_break_ties() {
        let b = int_index("b_idx", &["a"]);
        let primary = int_index("PRIMARY", &["a"]);
        let c = int_index("c_idx", &["a"]);
        let expr = eq("a", 1);
        let stats: Vec<_> = [b, primary, c]
            .into_iter()
            .map(|i| {
                let s = empty_stat(&i, vec![0]);
                (i, s)
            })
            .collect();
        assert_eq!(best_for(&expr, &stats).unwrap().index.id, "PRIMARY");
        assert_eq!(best_for(&expr, &[stats[2].clone(), stats[0].clone()]).unwrap().index.id, "b_idx");
        assert_eq!(best_for(&expr, &[stats[0].clone(), stats[2].clone()]).unwrap().index.id, "b_idx");
    }
}
