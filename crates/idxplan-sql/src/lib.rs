//! idxplan SQL - Expressions, values, index ranges and the logical plan

pub mod expr;
pub mod logical_plan;
pub mod range;
pub mod value;

pub use expr::{BinaryOperator, ColumnRef, Expr, UnaryOperator};
pub use logical_plan::{IndexLookup, LogicalPlan, LookupPayload};
pub use range::{Range, RangeCollection, RangeColumnExpr, RangeCut};
pub use value::{compare_values, Geometry, Literal, Point, TypeFamily};
