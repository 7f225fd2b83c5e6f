//! Decomposes a filter expression into an [`IndexFilter`] tree

use crate::classify::classify;
use crate::index_filter::{AndNode, ExprArena, IndexFilter, IndexLeaf, OrChild, OrNode};
use idxplan_common::IdSet;
use idxplan_sql::expr::join_and;
use idxplan_sql::{BinaryOperator, Expr};

/// Result of flattening one filter
#[derive(Debug, Clone)]
pub struct Flattened {
    /// Indexable part, `None` when nothing could be decomposed
    pub root: Option<IndexFilter>,
    /// Conjuncts the tree does not represent
    pub leftover: Option<Expr>,
    /// Ids whose index check does not exactly replace the predicate
    pub imprecise: IdSet,
}

/// Flattening context. Node ids are positions in the arena, so one context
/// produces unique ids for everything it flattens.
#[derive(Debug, Default)]
pub struct Flattener {
    arena: ExprArena,
    imprecise: IdSet,
}

enum Node {
    Leaf(IndexLeaf),
    And(AndNode, Vec<Expr>),
    Or(OrNode),
}

impl Flattener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    pub fn into_arena(self) -> ExprArena {
        self.arena
    }

    pub fn flatten(&mut self, expr: &Expr) -> Flattened {
        let (root, leftover) = match self.flatten_expr(expr) {
            None => (None, Some(expr.clone())),
            Some(Node::Leaf(l)) => (Some(IndexFilter::Leaf(l)), None),
            Some(Node::Or(o)) => (Some(IndexFilter::Or(o)), None),
            Some(Node::And(a, rest)) => {
                let leftover = join_and(rest);
                if a.is_empty() {
                    (None, leftover)
                } else {
                    (Some(IndexFilter::And(a)), leftover)
                }
            }
        };
        Flattened {
            root,
            leftover,
            imprecise: self.imprecise.clone(),
        }
    }

    fn flatten_expr(&mut self, expr: &Expr) -> Option<Node> {
        match expr {
            Expr::BinaryOp {
                op: BinaryOperator::And,
                ..
            } => Some(self.flatten_and(expr)),
            Expr::BinaryOp {
                op: BinaryOperator::Or,
                ..
            } => self.flatten_or(expr).map(Node::Or),
            _ => self.flatten_leaf(expr).map(Node::Leaf),
        }
    }

    fn flatten_leaf(&mut self, expr: &Expr) -> Option<IndexLeaf> {
        let id = self.arena.alloc(expr.clone());
        let classified = classify(expr)?;
        if classified.is_imprecise() {
            self.imprecise.insert(id);
        }
        Some(IndexLeaf {
            id,
            op: classified.op,
            column: classified.column,
            values: classified.values,
            fulltext_index: classified.fulltext_index,
        })
    }

    /// Conjunction; children that do not decompose come back as leftover
    fn flatten_and(&mut self, expr: &Expr) -> Node {
        let id = self.arena.alloc(expr.clone());
        let mut node = AndNode::new(id);
        let mut leftover = Vec::new();
        self.collect_and(expr, &mut node, &mut leftover);
        Node::And(node, leftover)
    }

    fn collect_and(&mut self, expr: &Expr, node: &mut AndNode, leftover: &mut Vec<Expr>) {
        let Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } = expr
        else {
            return;
        };
        for child in [left.as_ref(), right.as_ref()] {
            match self.flatten_expr(child) {
                Some(Node::Leaf(l)) => node.add_leaf(l),
                Some(Node::Or(o)) => node.or_children.push(o),
                Some(Node::And(nested, rest)) => {
                    // nested conjunctions merge into this one
                    for leaf in nested.leaves.into_values().flatten() {
                        node.add_leaf(leaf);
                    }
                    node.or_children.extend(nested.or_children);
                    leftover.extend(rest);
                }
                None => leftover.push(child.clone()),
            }
        }
    }

    /// Disjunction; any child that does not fully decompose rejects it
    fn flatten_or(&mut self, expr: &Expr) -> Option<OrNode> {
        let id = self.arena.alloc(expr.clone());
        let mut node = OrNode {
            id,
            children: vec![],
        };
        if !self.collect_or(expr, &mut node) {
            return None;
        }
        let imprecise = node.children.iter().any(|c| self.is_imprecise(c));
        if imprecise {
            self.imprecise.insert(id);
        }
        Some(node)
    }

    fn collect_or(&mut self, expr: &Expr, node: &mut OrNode) -> bool {
        let Expr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right,
        } = expr
        else {
            return false;
        };
        for child in [left.as_ref(), right.as_ref()] {
            match self.flatten_expr(child) {
                Some(Node::Leaf(l)) => node.children.push(OrChild::Leaf(l)),
                Some(Node::And(a, rest)) if rest.is_empty() && !a.is_empty() => {
                    node.children.push(OrChild::And(a))
                }
                Some(Node::Or(nested)) => node.children.extend(nested.children),
                _ => return false,
            }
        }
        true
    }

    fn is_imprecise(&self, child: &OrChild) -> bool {
        match child {
            OrChild::Leaf(l) => self.imprecise.contains(l.id),
            OrChild::And(a) => {
                a.leaves.values().flatten().any(|l| self.imprecise.contains(l.id))
                    || a.or_children.iter().any(|o| self.imprecise.contains(o.id))
            }
        }
    }
}
