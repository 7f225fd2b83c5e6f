//! idxplan Expression

use crate::value::{compare_values, Literal};
use arrow_schema::DataType;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A column reference that name resolution has already bound to a table
/// column, including its declared type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnRef {
    /// Table or alias qualifier, if any
    pub table: Option<String>,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            table: None,
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Lower-cased column name, the key used to match index columns
    pub fn norm_name(&self) -> String {
        self.name.to_lowercase()
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(t) => write!(f, "{}.{}", t, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Expression node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Expr {
    /// Column reference
    Column(ColumnRef),

    /// Literal value
    Literal(Literal),

    /// Binary operation
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },

    /// Unary operation
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },

    /// `expr IS NULL`
    IsNull(Box<Expr>),

    /// `expr IS NOT NULL`
    IsNotNull(Box<Expr>),

    /// `expr [NOT] IN (list)`
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },

    /// Function call, including the spatial predicates
    Function { name: String, args: Vec<Expr> },

    /// `MATCH (columns) AGAINST (query)`, bound to a full-text index
    MatchAgainst {
        columns: Vec<ColumnRef>,
        query: String,
        index: Option<String>,
    },

    /// Cast
    Cast { expr: Box<Expr>, data_type: DataType },

    /// Subquery, kept opaque at this layer
    Subquery { sql: String, outer_refs: Vec<String> },

    /// Bind variable (`?` or `:v1`)
    Placeholder(String),

    /// Stored procedure parameter
    ProcedureParam(String),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Eq,
    NullSafeEq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Like,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::NullSafeEq
                | BinaryOperator::Neq
                | BinaryOperator::Lt
                | BinaryOperator::Lte
                | BinaryOperator::Gt
                | BinaryOperator::Gte
        )
    }

    /// Operator to use once the operands are swapped (`1 < a` is `a > 1`)
    pub fn swap(&self) -> Self {
        match self {
            BinaryOperator::Lt => BinaryOperator::Gt,
            BinaryOperator::Lte => BinaryOperator::Gte,
            BinaryOperator::Gt => BinaryOperator::Lt,
            BinaryOperator::Gte => BinaryOperator::Lte,
            other => *other,
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::NullSafeEq => "<=>",
            BinaryOperator::Neq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Lte => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Gte => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Like => "LIKE",
        };
        write!(f, "{s}")
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Minus,
}

/// Spatial predicate function names recognized for spatial indexes
pub const SPATIAL_FUNCTIONS: [&str; 3] = ["st_intersects", "st_within", "st_equals"];

impl Expr {
    /// Get all column references in this expression
    pub fn get_columns(&self) -> Vec<String> {
        match self {
            Expr::Column(c) => vec![c.name.clone()],
            Expr::Literal(_) | Expr::Placeholder(_) | Expr::ProcedureParam(_) => vec![],
            Expr::BinaryOp { left, right, .. } => {
                let mut cols = left.get_columns();
                cols.extend(right.get_columns());
                cols
            }
            Expr::UnaryOp { expr, .. }
            | Expr::IsNull(expr)
            | Expr::IsNotNull(expr)
            | Expr::Cast { expr, .. } => expr.get_columns(),
            Expr::InList { expr, list, .. } => {
                let mut cols = expr.get_columns();
                cols.extend(list.iter().flat_map(|e| e.get_columns()));
                cols
            }
            Expr::Function { args, .. } => args.iter().flat_map(|a| a.get_columns()).collect(),
            Expr::MatchAgainst { columns, .. } => columns.iter().map(|c| c.name.clone()).collect(),
            // correlated references count as columns
            Expr::Subquery { outer_refs, .. } => outer_refs.clone(),
        }
    }

    /// Folds the expression to a constant. Returns `None` when it refers to a
    /// column, a subquery, a bind variable or a procedure parameter, or when
    /// folding fails.
    pub fn eval_constant(&self) -> Option<Literal> {
        match self {
            Expr::Literal(l) => Some(l.clone()),
            Expr::Column(_)
            | Expr::Subquery { .. }
            | Expr::Placeholder(_)
            | Expr::ProcedureParam(_)
            | Expr::MatchAgainst { .. } => None,
            Expr::Cast { expr, data_type } => expr.eval_constant()?.coerce_to(data_type).ok(),
            Expr::Function { name, args } => {
                // spatial constructors fold when their arguments do
                if name.eq_ignore_ascii_case("point") && args.len() == 2 {
                    let x = args[0].eval_constant()?.as_f64()?;
                    let y = args[1].eval_constant()?.as_f64()?;
                    Some(Literal::Geometry(crate::value::Geometry::point(x, y)))
                } else {
                    None
                }
            }
            _ => {
                if self.references_non_constant() {
                    return None;
                }
                Some(self.evaluate(&|_: &ColumnRef| Literal::Null))
            }
        }
    }

    fn references_non_constant(&self) -> bool {
        match self {
            Expr::Column(_)
            | Expr::Subquery { .. }
            | Expr::Placeholder(_)
            | Expr::ProcedureParam(_)
            | Expr::MatchAgainst { .. } => true,
            Expr::Literal(_) => false,
            Expr::BinaryOp { left, right, .. } => {
                left.references_non_constant() || right.references_non_constant()
            }
            Expr::UnaryOp { expr, .. }
            | Expr::IsNull(expr)
            | Expr::IsNotNull(expr)
            | Expr::Cast { expr, .. } => expr.references_non_constant(),
            Expr::InList { expr, list, .. } => {
                expr.references_non_constant() || list.iter().any(|e| e.references_non_constant())
            }
            Expr::Function { args, .. } => args.iter().any(|e| e.references_non_constant()),
        }
    }

    /// Evaluates the expression against one row, with SQL three-valued logic.
    /// Unknown results come back as `Literal::Null`.
    pub fn evaluate<F>(&self, row: &F) -> Literal
    where
        F: Fn(&ColumnRef) -> Literal,
    {
        match self {
            Expr::Column(c) => row(c),
            Expr::Literal(l) => l.clone(),
            Expr::BinaryOp { left, op, right } => {
                let l = left.evaluate(row);
                match op {
                    BinaryOperator::And => {
                        let r = right.evaluate(row);
                        match (l.as_bool(), r.as_bool()) {
                            (Some(false), _) | (_, Some(false)) => Literal::Boolean(false),
                            (Some(true), Some(true)) => Literal::Boolean(true),
                            _ => Literal::Null,
                        }
                    }
                    BinaryOperator::Or => {
                        let r = right.evaluate(row);
                        match (l.as_bool(), r.as_bool()) {
                            (Some(true), _) | (_, Some(true)) => Literal::Boolean(true),
                            (Some(false), Some(false)) => Literal::Boolean(false),
                            _ => Literal::Null,
                        }
                    }
                    BinaryOperator::NullSafeEq => {
                        let r = right.evaluate(row);
                        Literal::Boolean(match (l.is_null(), r.is_null()) {
                            (true, true) => true,
                            (false, false) => compare_values(&l, &r) == Some(Ordering::Equal),
                            _ => false,
                        })
                    }
                    BinaryOperator::Eq
                    | BinaryOperator::Neq
                    | BinaryOperator::Lt
                    | BinaryOperator::Lte
                    | BinaryOperator::Gt
                    | BinaryOperator::Gte => {
                        let r = right.evaluate(row);
                        match compare_values(&l, &r) {
                            None => Literal::Null,
                            Some(ord) => Literal::Boolean(match op {
                                BinaryOperator::Eq => ord == Ordering::Equal,
                                BinaryOperator::Neq => ord != Ordering::Equal,
                                BinaryOperator::Lt => ord == Ordering::Less,
                                BinaryOperator::Lte => ord != Ordering::Greater,
                                BinaryOperator::Gt => ord == Ordering::Greater,
                                _ => ord != Ordering::Less,
                            }),
                        }
                    }
                    BinaryOperator::Like => {
                        let r = right.evaluate(row);
                        match (l, r) {
                            (Literal::String(s), Literal::String(p)) => {
                                Literal::Boolean(like_match(&s, &p))
                            }
                            _ => Literal::Null,
                        }
                    }
                    BinaryOperator::Plus
                    | BinaryOperator::Minus
                    | BinaryOperator::Multiply
                    | BinaryOperator::Divide
                    | BinaryOperator::Modulo => {
                        let r = right.evaluate(row);
                        l.arithmetic(*op, &r)
                    }
                }
            }
            Expr::UnaryOp { op, expr } => {
                let v = expr.evaluate(row);
                match op {
                    UnaryOperator::Not => match v.as_bool() {
                        Some(b) => Literal::Boolean(!b),
                        None => Literal::Null,
                    },
                    UnaryOperator::Minus => match v {
                        Literal::Int(i) => i.checked_neg().map_or(Literal::Null, Literal::Int),
                        Literal::Float(f) => Literal::Float(-f),
                        _ => Literal::Null,
                    },
                }
            }
            Expr::IsNull(expr) => Literal::Boolean(expr.evaluate(row).is_null()),
            Expr::IsNotNull(expr) => Literal::Boolean(!expr.evaluate(row).is_null()),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let v = expr.evaluate(row);
                if v.is_null() {
                    return Literal::Null;
                }
                let mut saw_null = false;
                let mut found = false;
                for item in list {
                    let item = item.evaluate(row);
                    match compare_values(&v, &item) {
                        Some(Ordering::Equal) => {
                            found = true;
                            break;
                        }
                        None => saw_null = true,
                        Some(_) => {}
                    }
                }
                match (found, saw_null) {
                    (true, _) => Literal::Boolean(!negated),
                    (false, true) => Literal::Null,
                    (false, false) => Literal::Boolean(*negated),
                }
            }
            Expr::Function { name, args } => {
                let lower = name.to_lowercase();
                if SPATIAL_FUNCTIONS.contains(&lower.as_str()) && args.len() == 2 {
                    let (a, b) = (args[0].evaluate(row), args[1].evaluate(row));
                    match (a, b) {
                        (Literal::Geometry(a), Literal::Geometry(b)) => {
                            Literal::Boolean(match lower.as_str() {
                                "st_intersects" => a.bbox_intersects(&b),
                                "st_within" => a.bbox_within(&b),
                                _ => a == b,
                            })
                        }
                        _ => Literal::Null,
                    }
                } else {
                    self.eval_constant().unwrap_or(Literal::Null)
                }
            }
            Expr::MatchAgainst { columns, query, .. } => {
                let needle = query.to_lowercase();
                let hit = columns.iter().any(|c| match row(c) {
                    Literal::String(s) => s.to_lowercase().contains(&needle),
                    _ => false,
                });
                Literal::Boolean(hit)
            }
            Expr::Cast { expr, data_type } => expr
                .evaluate(row)
                .coerce_to(data_type)
                .unwrap_or(Literal::Null),
            Expr::Subquery { .. } | Expr::Placeholder(_) | Expr::ProcedureParam(_) => Literal::Null,
        }
    }

    /// True when the expression evaluates to TRUE for the row
    pub fn is_true_for<F>(&self, row: &F) -> bool
    where
        F: Fn(&ColumnRef) -> Literal,
    {
        self.evaluate(row).as_bool() == Some(true)
    }
}

fn like_match(s: &str, pattern: &str) -> bool {
    fn rec(s: &[char], p: &[char]) -> bool {
        match p.split_first() {
            None => s.is_empty(),
            Some(('%', rest)) => (0..=s.len()).any(|i| rec(&s[i..], rest)),
            Some(('_', rest)) => !s.is_empty() && rec(&s[1..], rest),
            Some((c, rest)) => s.first() == Some(c) && rec(&s[1..], rest),
        }
    }
    let s: Vec<char> = s.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    rec(&s, &p)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{c}"),
            Expr::Literal(l) => write!(f, "{l}"),
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::And | BinaryOperator::Or => write!(f, "({left} {op} {right})"),
                _ => write!(f, "{left} {op} {right}"),
            },
            Expr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => write!(f, "NOT ({expr})"),
                UnaryOperator::Minus => write!(f, "-{expr}"),
            },
            Expr::IsNull(e) => write!(f, "{e} IS NULL"),
            Expr::IsNotNull(e) => write!(f, "{e} IS NOT NULL"),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let items: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{expr} {not}IN ({})", items.join(", "))
            }
            Expr::Function { name, args } => {
                let items: Vec<String> = args.iter().map(|e| e.to_string()).collect();
                write!(f, "{name}({})", items.join(", "))
            }
            Expr::MatchAgainst { columns, query, .. } => {
                let cols: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
                write!(f, "MATCH ({}) AGAINST ('{query}')", cols.join(", "))
            }
            Expr::Cast { expr, data_type } => write!(f, "CAST({expr} AS {data_type})"),
            Expr::Subquery { sql, .. } => write!(f, "({sql})"),
            Expr::Placeholder(name) => write!(f, "{name}"),
            Expr::ProcedureParam(name) => write!(f, "@{name}"),
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn col(name: &str, data_type: DataType) -> Expr {
    Expr::Column(ColumnRef::new(name, data_type))
}

pub fn lit(value: impl Into<Literal>) -> Expr {
    Expr::Literal(value.into())
}

pub fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

pub fn and(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOperator::And, right)
}

pub fn or(left: Expr, right: Expr) -> Expr {
    binary(left, BinaryOperator::Or, right)
}

pub fn not(expr: Expr) -> Expr {
    Expr::UnaryOp {
        op: UnaryOperator::Not,
        expr: Box::new(expr),
    }
}

pub fn in_list(expr: Expr, list: Vec<Expr>, negated: bool) -> Expr {
    Expr::InList {
        expr: Box::new(expr),
        list,
        negated,
    }
}

/// Splits nested ANDs into a flat list of conjuncts, left to right
pub fn split_conjunction(predicate: &Expr) -> Vec<Expr> {
    let mut exprs = vec![];
    let mut stack = vec![predicate];
    while let Some(expr) = stack.pop() {
        match expr {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => {
                stack.push(right);
                stack.push(left);
            }
            _ => exprs.push(expr.clone()),
        }
    }
    exprs
}

/// Left-deep AND of the given expressions, `None` when empty
pub fn join_and(exprs: Vec<Expr>) -> Option<Expr> {
    exprs.into_iter().reduce(and)
}

/// Left-deep OR of the given expressions, `None` when empty
pub fn join_or(exprs: Vec<Expr>) -> Option<Expr> {
    exprs.into_iter().reduce(or)
}
