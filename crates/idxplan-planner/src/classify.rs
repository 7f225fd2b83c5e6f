//! Recognizes indexable predicates

use crate::index_filter::IndexScanOp;
use idxplan_sql::expr::SPATIAL_FUNCTIONS;
use idxplan_sql::{BinaryOperator, ColumnRef, Expr, Literal, TypeFamily, UnaryOperator};

/// Indexable shape of one predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub op: IndexScanOp,
    pub column: ColumnRef,
    pub values: Vec<Literal>,
    pub fulltext_index: Option<String>,
}

impl Classified {
    fn new(op: IndexScanOp, column: &ColumnRef, values: Vec<Literal>) -> Self {
        Self {
            op,
            column: column.clone(),
            values,
            fulltext_index: None,
        }
    }

    /// The index comparison may differ from the predicate: some operand has a
    /// type family other than the column's, so the predicate coerces
    pub fn is_imprecise(&self) -> bool {
        if matches!(self.op, IndexScanOp::SpatialEq | IndexScanOp::FulltextEq) {
            return false;
        }
        let family = TypeFamily::of(&self.column.data_type);
        self.values
            .iter()
            .any(|v| v.family().is_some_and(|f| f != family))
    }
}

/// Classifies a boolean expression as an indexable leaf. Returns `None` for
/// shapes an index cannot answer: non-constant operands, column-to-column
/// comparisons, comparisons against NULL, unknown functions.
pub fn classify(expr: &Expr) -> Option<Classified> {
    match expr {
        Expr::BinaryOp { left, op, right } => classify_comparison(left, *op, right),
        Expr::IsNull(inner) => Some(Classified::new(
            IndexScanOp::IsNull,
            as_column(inner)?,
            vec![],
        )),
        Expr::IsNotNull(inner) => Some(Classified::new(
            IndexScanOp::IsNotNull,
            as_column(inner)?,
            vec![],
        )),
        Expr::InList {
            expr,
            list,
            negated,
        } => classify_in_list(expr, list, *negated),
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } => classify_not(expr),
        Expr::Function { name, args } => classify_spatial(name, args),
        Expr::MatchAgainst { columns, index, .. } => {
            let mut c = Classified::new(IndexScanOp::FulltextEq, columns.first()?, vec![]);
            c.fulltext_index = index.clone();
            Some(c)
        }
        _ => None,
    }
}

fn as_column(expr: &Expr) -> Option<&ColumnRef> {
    match expr {
        Expr::Column(c) => Some(c),
        _ => None,
    }
}

fn classify_comparison(left: &Expr, op: BinaryOperator, right: &Expr) -> Option<Classified> {
    let scan_op = match op {
        BinaryOperator::Eq => IndexScanOp::Eq,
        BinaryOperator::NullSafeEq => IndexScanOp::NullSafeEq,
        BinaryOperator::Neq => IndexScanOp::NotEq,
        BinaryOperator::Gt => IndexScanOp::Gt,
        BinaryOperator::Gte => IndexScanOp::Gte,
        BinaryOperator::Lt => IndexScanOp::Lt,
        BinaryOperator::Lte => IndexScanOp::Lte,
        _ => return None,
    };
    let (column, constant, scan_op) = match (as_column(left), as_column(right)) {
        (Some(c), None) => (c, right, scan_op),
        (None, Some(c)) => (c, left, scan_op.swap()),
        _ => return None,
    };
    let value = constant.eval_constant()?;
    if value.is_null() && scan_op != IndexScanOp::NullSafeEq {
        return None;
    }
    Some(Classified::new(scan_op, column, vec![value]))
}

fn classify_in_list(expr: &Expr, list: &[Expr], negated: bool) -> Option<Classified> {
    let column = as_column(expr)?;
    let mut values = list
        .iter()
        .map(Expr::eval_constant)
        .collect::<Option<Vec<_>>>()?;
    if negated {
        // NOT IN with a NULL member is never true
        if values.iter().any(Literal::is_null) {
            return None;
        }
    } else {
        values.retain(|v| !v.is_null());
    }
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup_by(|a, b| a.total_cmp(b).is_eq());
    let op = if negated {
        IndexScanOp::NotInSet
    } else {
        IndexScanOp::InSet
    };
    Some(Classified::new(op, column, values))
}

fn classify_not(inner: &Expr) -> Option<Classified> {
    match inner {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } => {
            let mut c = classify_comparison(left, BinaryOperator::Eq, right)?;
            c.op = IndexScanOp::NotEq;
            Some(c)
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => classify_in_list(expr, list, !negated),
        Expr::IsNull(e) => Some(Classified::new(IndexScanOp::IsNotNull, as_column(e)?, vec![])),
        Expr::IsNotNull(e) => Some(Classified::new(IndexScanOp::IsNull, as_column(e)?, vec![])),
        _ => None,
    }
}

fn classify_spatial(name: &str, args: &[Expr]) -> Option<Classified> {
    let name = name.to_lowercase();
    if !SPATIAL_FUNCTIONS.contains(&name.as_str()) || args.len() != 2 {
        return None;
    }
    let (column, constant) = match (as_column(&args[0]), as_column(&args[1])) {
        (Some(c), None) => (c, &args[1]),
        (None, Some(c)) => (c, &args[0]),
        _ => return None,
    };
    let value = constant.eval_constant()?;
    Some(Classified::new(IndexScanOp::SpatialEq, column, vec![value]))
}
