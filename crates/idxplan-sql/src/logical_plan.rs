//! Logical Query Plan representation

use crate::expr::Expr;
use crate::range::RangeCollection;
use arrow_schema::{Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Logical Query Plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogicalPlan {
    /// Full scan of a table
    Scan {
        database: String,
        table_name: String,
        schema: SchemaRef,
        projection: Option<Vec<String>>,
    },

    /// Filter rows
    Filter {
        input: Box<LogicalPlan>,
        predicate: Expr,
    },

    /// Alias for a relation
    TableAlias {
        input: Box<LogicalPlan>,
        alias: String,
    },

    /// Project columns
    Project {
        input: Box<LogicalPlan>,
        expr: Vec<Expr>,
        schema: SchemaRef,
    },

    /// Limit rows
    Limit {
        input: Box<LogicalPlan>,
        limit: usize,
        offset: usize,
    },

    /// Table read through an index lookup
    IndexedTableAccess {
        database: String,
        table_name: String,
        schema: SchemaRef,
        index_id: String,
        lookup: IndexLookup,
    },
}

/// What an indexed access reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexLookup {
    pub index_id: String,
    pub payload: LookupPayload,
    /// The lookup can match no rows
    pub is_empty: bool,
    pub is_spatial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LookupPayload {
    /// Disjoint ranges over the index columns
    Ranges(RangeCollection),
    /// Full-text search driven by a MATCH ... AGAINST expression
    FullText(Expr),
    /// Nearest-neighbor scan ordered by a distance expression
    VectorOrder { distance: Expr, limit: usize },
}

impl IndexLookup {
    pub fn ranges(&self) -> Option<&RangeCollection> {
        match &self.payload {
            LookupPayload::Ranges(r) => Some(r),
            LookupPayload::FullText(_) | LookupPayload::VectorOrder { .. } => None,
        }
    }
}

impl LogicalPlan {
    /// Get the schema (output columns) of this plan
    pub fn schema(&self) -> SchemaRef {
        match self {
            LogicalPlan::Scan { schema, .. } => schema.clone(),
            LogicalPlan::IndexedTableAccess { schema, .. } => schema.clone(),
            LogicalPlan::Filter { input, .. } => input.schema(),
            LogicalPlan::Project { schema, .. } => schema.clone(),
            LogicalPlan::Limit { input, .. } => input.schema(),
            LogicalPlan::TableAlias { input, alias } => {
                let schema = input.schema();
                let fields: Vec<_> = schema
                    .fields()
                    .iter()
                    .map(|f| {
                        Field::new(
                            format!("{}.{}", alias, f.name()),
                            f.data_type().clone(),
                            f.is_nullable(),
                        )
                    })
                    .collect();
                Arc::new(Schema::new(fields))
            }
        }
    }

    /// Get table references from this plan
    pub fn table_refs(&self) -> Vec<String> {
        match self {
            LogicalPlan::Scan { table_name, .. }
            | LogicalPlan::IndexedTableAccess { table_name, .. } => vec![table_name.clone()],
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::TableAlias { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Limit { input, .. } => input.table_refs(),
        }
    }

    /// Child plans
    pub fn inputs(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Scan { .. } | LogicalPlan::IndexedTableAccess { .. } => vec![],
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::TableAlias { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Limit { input, .. } => vec![input.as_ref()],
        }
    }

    /// Indented one-node-per-line rendering
    pub fn display_indent(&self) -> String {
        let mut out = String::new();
        self.fmt_indent(&mut out, 0);
        out
    }

    fn fmt_indent(&self, out: &mut String, depth: usize) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&self.to_string());
        out.push('\n');
        for input in self.inputs() {
            input.fmt_indent(out, depth + 1);
        }
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalPlan::Scan { table_name, .. } => write!(f, "Scan: {table_name}"),
            LogicalPlan::Filter { predicate, .. } => write!(f, "Filter: {predicate}"),
            LogicalPlan::TableAlias { alias, .. } => write!(f, "TableAlias: {alias}"),
            LogicalPlan::Project { expr, .. } => {
                let cols: Vec<_> = expr.iter().map(|e| e.to_string()).collect();
                write!(f, "Project: {}", cols.join(", "))
            }
            LogicalPlan::Limit { limit, offset, .. } => {
                write!(f, "Limit: {limit} offset {offset}")
            }
            LogicalPlan::IndexedTableAccess {
                table_name,
                index_id,
                lookup,
                ..
            } => {
                write!(f, "IndexedTableAccess: {table_name} index={index_id}")?;
                match &lookup.payload {
                    LookupPayload::Ranges(r) => write!(f, " ranges={r}"),
                    LookupPayload::FullText(e) => write!(f, " fulltext={e}"),
                    LookupPayload::VectorOrder { distance, limit } => {
                        write!(f, " order={distance} limit={limit}")
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{binary, col, lit, BinaryOperator};
    use crate::range::{Range, RangeColumnExpr};
    use crate::value::Literal;
    use arrow_schema::DataType;

    fn scan() -> LogicalPlan {
        LogicalPlan::Scan {
            database: "db".into(),
            table_name: "t".into(),
            schema: Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, true)])),
            projection: None,
        }
    }

    #[test]
    fn test_alias_schema_and_refs() {
        let plan = LogicalPlan::TableAlias {
            input: Box::new(scan()),
            alias: "x".into(),
        };
        assert_eq!(plan.schema().field(0).name(), "x.a");
        assert_eq!(plan.table_refs(), vec!["t".to_string()]);
    }

    #[test]
    fn test_display_indent() {
        let filter = LogicalPlan::Filter {
            input: Box::new(LogicalPlan::IndexedTableAccess {
                database: "db".into(),
                table_name: "t".into(),
                schema: scan().schema(),
                index_id: "primary".into(),
                lookup: IndexLookup {
                    index_id: "primary".into(),
                    payload: LookupPayload::Ranges(RangeCollection::new(vec![Range::new(
                        vec![RangeColumnExpr::point(Literal::Int(1), DataType::Int64)],
                    )])),
                    is_empty: false,
                    is_spatial: false,
                },
            }),
            predicate: binary(col("a", DataType::Int64), BinaryOperator::Gt, lit(0)),
        };
        assert_eq!(
            filter.display_indent(),
            "Filter: a > 0\n  IndexedTableAccess: t index=primary ranges=[{[1, 1]}]\n"
        );
    }
}
