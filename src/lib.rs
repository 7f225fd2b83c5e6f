//! idxplan - Cost-based index selection for filtered table scans
//!
//! The workspace crates are re-exported under short names:
//!
//! - [`common`]: errors, [`CosterConfig`] and id sets
//! - [`sql`]: expressions, values, index ranges and the logical plan
//! - [`catalog`]: tables, indexes and per-index statistics
//! - [`planner`]: filter flattening, index costing and the optimizer rule

pub use idxplan_catalog as catalog;
pub use idxplan_common as common;
pub use idxplan_planner as planner;
pub use idxplan_sql as sql;

pub use idxplan_catalog::{CatalogProvider, InMemoryCatalog, StatsProvider, TableEntry};
pub use idxplan_common::{CosterConfig, IdxError, Result};
pub use idxplan_planner::{costed_index_scan, CostedIndexScanResult, Optimizer};
pub use idxplan_sql::{Expr, LogicalPlan};

use std::sync::Arc;

/// Optimizer running costed index selection against one in-memory catalog
pub fn index_selection_optimizer(catalog: Arc<InMemoryCatalog>, config: CosterConfig) -> Optimizer {
    tracing::debug!(enabled = config.enabled, "building index selection optimizer");
    Optimizer::with_index_selection(catalog.clone(), catalog, config)
}
