//! Flattened filter tree used for index costing
//!
//! Every node carries an id into the [`ExprArena`] of the flattening pass
//! that built it. The arena maps the id back to the original expression, so
//! uncovered nodes can be re-emitted as residual predicates.

use idxplan_common::{IdSet, IdxError, Result};
use idxplan_sql::expr::{join_and, join_or};
use idxplan_sql::{ColumnRef, Expr, Literal};
use std::collections::BTreeMap;
use std::fmt;

pub type ExprId = usize;

/// Side table from node id to source expression
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    exprs: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, expr: Expr) -> ExprId {
        self.exprs.push(expr);
        self.exprs.len() - 1
    }

    pub fn get(&self, id: ExprId) -> Result<&Expr> {
        self.exprs
            .get(id)
            .ok_or_else(|| IdxError::Internal(format!("filter id {id} is not in the expression arena")))
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

/// Operator of an indexable leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexScanOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    InSet,
    NotInSet,
    IsNull,
    IsNotNull,
    NullSafeEq,
    SpatialEq,
    FulltextEq,
}

impl IndexScanOp {
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            IndexScanOp::Gt | IndexScanOp::Gte | IndexScanOp::Lt | IndexScanOp::Lte
        )
    }

    /// Operators usable on a column whose index entry is a content hash
    pub fn allowed_on_hashed_column(&self) -> bool {
        matches!(
            self,
            IndexScanOp::Eq
                | IndexScanOp::NotEq
                | IndexScanOp::NullSafeEq
                | IndexScanOp::IsNull
                | IndexScanOp::IsNotNull
        )
    }

    /// Operator with its operands swapped (`1 < a` becomes `a > 1`)
    pub fn swap(&self) -> Self {
        match self {
            IndexScanOp::Gt => IndexScanOp::Lt,
            IndexScanOp::Gte => IndexScanOp::Lte,
            IndexScanOp::Lt => IndexScanOp::Gt,
            IndexScanOp::Lte => IndexScanOp::Gte,
            other => *other,
        }
    }
}

impl fmt::Display for IndexScanOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexScanOp::Eq => "=",
            IndexScanOp::NotEq => "!=",
            IndexScanOp::Gt => ">",
            IndexScanOp::Gte => ">=",
            IndexScanOp::Lt => "<",
            IndexScanOp::Lte => "<=",
            IndexScanOp::InSet => "IN",
            IndexScanOp::NotInSet => "NOT IN",
            IndexScanOp::IsNull => "IS NULL",
            IndexScanOp::IsNotNull => "IS NOT NULL",
            IndexScanOp::NullSafeEq => "<=>",
            IndexScanOp::SpatialEq => "SPATIAL",
            IndexScanOp::FulltextEq => "MATCH",
        };
        write!(f, "{s}")
    }
}

/// Single indexable predicate
#[derive(Debug, Clone, PartialEq)]
pub struct IndexLeaf {
    pub id: ExprId,
    pub op: IndexScanOp,
    pub column: ColumnRef,
    /// Constant operands: one for comparisons, the set for IN, none for null
    /// tests and MATCH
    pub values: Vec<Literal>,
    /// Index named by a MATCH expression
    pub fulltext_index: Option<String>,
}

impl IndexLeaf {
    /// Pins the column to one value
    pub fn is_point(&self) -> bool {
        match self.op {
            IndexScanOp::Eq | IndexScanOp::NullSafeEq | IndexScanOp::IsNull => true,
            IndexScanOp::InSet => self.values.len() == 1,
            _ => false,
        }
    }

    /// Pinned value for point leaves
    pub fn point_value(&self) -> Option<Literal> {
        match self.op {
            IndexScanOp::IsNull => Some(Literal::Null),
            _ if self.is_point() => self.values.first().cloned(),
            _ => None,
        }
    }
}

/// Conjunction: leaves grouped by lower-cased column name, plus disjunctions
#[derive(Debug, Clone, PartialEq)]
pub struct AndNode {
    pub id: ExprId,
    pub leaves: BTreeMap<String, Vec<IndexLeaf>>,
    pub or_children: Vec<OrNode>,
}

impl AndNode {
    pub fn new(id: ExprId) -> Self {
        Self {
            id,
            leaves: BTreeMap::new(),
            or_children: vec![],
        }
    }

    pub fn add_leaf(&mut self, leaf: IndexLeaf) {
        self.leaves
            .entry(leaf.column.norm_name())
            .or_default()
            .push(leaf);
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty() && self.or_children.is_empty()
    }

    /// Leaves in id order
    pub fn all_leaves(&self) -> Vec<&IndexLeaf> {
        let mut leaves: Vec<_> = self.leaves.values().flatten().collect();
        leaves.sort_by_key(|l| l.id);
        leaves
    }
}

/// Disjunction
#[derive(Debug, Clone, PartialEq)]
pub struct OrNode {
    pub id: ExprId,
    pub children: Vec<OrChild>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrChild {
    Leaf(IndexLeaf),
    And(AndNode),
}

impl OrChild {
    pub fn id(&self) -> ExprId {
        match self {
            OrChild::Leaf(l) => l.id,
            OrChild::And(a) => a.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexFilter {
    Leaf(IndexLeaf),
    And(AndNode),
    Or(OrNode),
}

impl IndexFilter {
    pub fn id(&self) -> ExprId {
        match self {
            IndexFilter::Leaf(l) => l.id,
            IndexFilter::And(a) => a.id,
            IndexFilter::Or(o) => o.id,
        }
    }

    /// Every leaf in the tree, in id order
    pub fn leaves(&self) -> Vec<&IndexLeaf> {
        let mut out = Vec::new();
        match self {
            IndexFilter::Leaf(l) => out.push(l),
            IndexFilter::And(a) => collect_and_leaves(a, &mut out),
            IndexFilter::Or(o) => collect_or_leaves(o, &mut out),
        }
        out.sort_by_key(|l| l.id);
        out
    }

    /// Rebuilds an equivalent boolean expression from the source expressions
    /// of the tree's leaves
    pub fn to_expr(&self, arena: &ExprArena) -> Result<Expr> {
        match self {
            IndexFilter::Leaf(l) => arena.get(l.id).cloned(),
            IndexFilter::And(a) => and_to_expr(a, arena),
            IndexFilter::Or(o) => or_to_expr(o, arena),
        }
    }
}

fn collect_and_leaves<'a>(and: &'a AndNode, out: &mut Vec<&'a IndexLeaf>) {
    out.extend(and.leaves.values().flatten());
    for or in &and.or_children {
        collect_or_leaves(or, out);
    }
}

fn collect_or_leaves<'a>(or: &'a OrNode, out: &mut Vec<&'a IndexLeaf>) {
    for child in &or.children {
        match child {
            OrChild::Leaf(l) => out.push(l),
            OrChild::And(a) => collect_and_leaves(a, out),
        }
    }
}

fn and_to_expr(and: &AndNode, arena: &ExprArena) -> Result<Expr> {
    let mut parts: Vec<(ExprId, Expr)> = Vec::new();
    for leaf in and.all_leaves() {
        parts.push((leaf.id, arena.get(leaf.id)?.clone()));
    }
    for or in &and.or_children {
        parts.push((or.id, or_to_expr(or, arena)?));
    }
    parts.sort_by_key(|(id, _)| *id);
    join_and(parts.into_iter().map(|(_, e)| e).collect())
        .ok_or_else(|| IdxError::Internal(format!("empty conjunction {}", and.id)))
}

fn or_to_expr(or: &OrNode, arena: &ExprArena) -> Result<Expr> {
    let mut parts = Vec::with_capacity(or.children.len());
    for child in &or.children {
        parts.push(match child {
            OrChild::Leaf(l) => arena.get(l.id)?.clone(),
            OrChild::And(a) => and_to_expr(a, arena)?,
        });
    }
    join_or(parts).ok_or_else(|| IdxError::Internal(format!("empty disjunction {}", or.id)))
}

/// Ids of every node under an OR child, the child itself included
pub fn subtree_ids(child: &OrChild) -> IdSet {
    let mut ids = IdSet::singleton(child.id());
    if let OrChild::And(a) = child {
        for leaf in a.leaves.values().flatten() {
            ids.insert(leaf.id);
        }
        for or in &a.or_children {
            ids.insert(or.id);
            for c in &or.children {
                ids = ids.union(&subtree_ids(c));
            }
        }
    }
    ids
}

/// Indented rendering of a filter tree for plan traces
pub fn format_index_filter(filter: &IndexFilter) -> String {
    let mut out = String::new();
    match filter {
        IndexFilter::Leaf(l) => format_leaf(l, 0, &mut out),
        IndexFilter::And(a) => format_and(a, 0, &mut out),
        IndexFilter::Or(o) => format_or(o, 0, &mut out),
    }
    out
}

fn format_leaf(leaf: &IndexLeaf, depth: usize, out: &mut String) {
    let values: Vec<String> = leaf.values.iter().map(|v| v.to_string()).collect();
    out.push_str(&format!(
        "{}leaf({}): {} {} {}\n",
        "  ".repeat(depth),
        leaf.id,
        leaf.column,
        leaf.op,
        values.join(", ")
    ));
}

fn format_and(and: &AndNode, depth: usize, out: &mut String) {
    out.push_str(&format!("{}and({})\n", "  ".repeat(depth), and.id));
    for leaf in and.all_leaves() {
        format_leaf(leaf, depth + 1, out);
    }
    for or in &and.or_children {
        format_or(or, depth + 1, out);
    }
}

fn format_or(or: &OrNode, depth: usize, out: &mut String) {
    out.push_str(&format!("{}or({})\n", "  ".repeat(depth), or.id));
    for child in &or.children {
        match child {
            OrChild::Leaf(l) => format_leaf(l, depth + 1, out),
            OrChild::And(a) => format_and(a, depth + 1, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::DataType;

    fn leaf(id: ExprId, col: &str, op: IndexScanOp, v: i64) -> IndexLeaf {
        IndexLeaf {
            id,
            op,
            column: ColumnRef::new(col, DataType::Int64),
            values: vec![Literal::Int(v)],
            fulltext_index: None,
        }
    }

    #[test]
    fn test_arena_missing_id_is_internal() {
        let arena = ExprArena::new();
        assert!(matches!(arena.get(3), Err(IdxError::Internal(_))));
    }

    #[test]
    fn test_and_groups_by_column() {
        let mut and = AndNode::new(0);
        and.add_leaf(leaf(2, "B", IndexScanOp::Gt, 5));
        and.add_leaf(leaf(1, "a", IndexScanOp::Eq, 1));
        and.add_leaf(leaf(3, "b", IndexScanOp::Lt, 9));
        assert_eq!(and.leaves.len(), 2);
        assert_eq!(and.leaves["b"].len(), 2);
        let ids: Vec<_> = and.all_leaves().iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(
            format_index_filter(&IndexFilter::And(and)),
            "and(0)\n  leaf(1): a = 1\n  leaf(2): B > 5\n  leaf(3): b < 9\n"
        );
    }

    #[test]
    fn test_point_leaves() {
        assert!(leaf(0, "a", IndexScanOp::Eq, 1).is_point());
        assert!(!leaf(0, "a", IndexScanOp::Gte, 1).is_point());
        let mut set = leaf(0, "a", IndexScanOp::InSet, 1);
        assert!(set.is_point());
        set.values.push(Literal::Int(2));
        assert!(!set.is_point());
        assert_eq!(IndexScanOp::Gt.swap(), IndexScanOp::Lt);
    }
}
