//! Optimizer rules

use crate::index_scan::costed_index_scan;
use idxplan_catalog::{CatalogProvider, StatsProvider};
use idxplan_common::{CosterConfig, IdxError, Result};
use idxplan_sql::{Expr, LogicalPlan};
use std::sync::Arc;
use tracing::{debug, warn};

/// Optimizer that applies a chain of rules
pub struct Optimizer {
    rules: Vec<Box<dyn OptimizerRule>>,
}

impl Optimizer {
    pub fn new(rules: Vec<Box<dyn OptimizerRule>>) -> Self {
        Self { rules }
    }

    /// Chain with the costed index scan rule
    pub fn with_index_selection(
        catalog: Arc<dyn CatalogProvider>,
        stats: Arc<dyn StatsProvider>,
        config: CosterConfig,
    ) -> Self {
        Self::new(vec![Box::new(CostedIndexScan::new(catalog, stats, config))])
    }

    pub fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let mut current = plan;
        for rule in &self.rules {
            debug!(rule = rule.name(), "applying optimizer rule");
            current = rule.optimize(current)?;
        }
        Ok(current)
    }
}

/// Optimizer rule trait
pub trait OptimizerRule: Send + Sync {
    fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan>;
    fn name(&self) -> &str;
}

/// Replaces `Filter(Scan)` with an indexed access when an index beats the
/// full scan
pub struct CostedIndexScan {
    catalog: Arc<dyn CatalogProvider>,
    stats: Arc<dyn StatsProvider>,
    config: CosterConfig,
}

impl CostedIndexScan {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        stats: Arc<dyn StatsProvider>,
        config: CosterConfig,
    ) -> Self {
        Self {
            catalog,
            stats,
            config,
        }
    }

    fn rewrite(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        match plan {
            LogicalPlan::Filter { input, predicate } => match *input {
                scan @ LogicalPlan::Scan { .. } => self.rewrite_filter(scan, None, predicate),
                LogicalPlan::TableAlias { input: inner, alias }
                    if matches!(*inner, LogicalPlan::Scan { .. }) =>
                {
                    self.rewrite_filter(*inner, Some(alias), predicate)
                }
                other => Ok(LogicalPlan::Filter {
                    input: Box::new(self.rewrite(other)?),
                    predicate,
                }),
            },
            LogicalPlan::TableAlias { input, alias } => Ok(LogicalPlan::TableAlias {
                input: Box::new(self.rewrite(*input)?),
                alias,
            }),
            LogicalPlan::Project {
                input,
                expr,
                schema,
            } => Ok(LogicalPlan::Project {
                input: Box::new(self.rewrite(*input)?),
                expr,
                schema,
            }),
            LogicalPlan::Limit {
                input,
                limit,
                offset,
            } => Ok(LogicalPlan::Limit {
                input: Box::new(self.rewrite(*input)?),
                limit,
                offset,
            }),
            LogicalPlan::Scan { .. } | LogicalPlan::IndexedTableAccess { .. } => Ok(plan),
        }
    }

    /// Rewrites one `Filter(Scan)`, or `Filter(TableAlias(Scan))` when
    /// `alias` is set
    fn rewrite_filter(
        &self,
        scan: LogicalPlan,
        alias: Option<String>,
        predicate: Expr,
    ) -> Result<LogicalPlan> {
        let original = |scan: LogicalPlan, alias: Option<String>, predicate: Expr| {
            let input = match alias {
                Some(alias) => LogicalPlan::TableAlias {
                    input: Box::new(scan),
                    alias,
                },
                None => scan,
            };
            LogicalPlan::Filter {
                input: Box::new(input),
                predicate,
            }
        };

        let names = match &scan {
            LogicalPlan::Scan {
                database,
                table_name,
                ..
            } => Some((database.clone(), table_name.clone())),
            _ => None,
        };
        let Some((database, table_name)) = names else {
            return Ok(original(scan, alias, predicate));
        };
        let Some(table) = self.catalog.table(&database, &table_name) else {
            warn!(database = %database, table = %table_name, "table not in catalog, keeping scan");
            return Ok(original(scan, alias, predicate));
        };

        let result = match costed_index_scan(self.stats.as_ref(), &table, &predicate, &self.config) {
            Ok(Some(result)) if !result.is_false => result,
            Ok(_) => return Ok(original(scan, alias, predicate)),
            Err(e) if e.is_recoverable() || matches!(e, IdxError::NotFound(_)) => {
                warn!(table = %table_name, error = %e, "keeping table scan");
                return Ok(original(scan, alias, predicate));
            }
            Err(e) => return Err(e),
        };

        let mut plan = result.access;
        if let Some(alias) = alias {
            plan = LogicalPlan::TableAlias {
                input: Box::new(plan),
                alias,
            };
        }
        if let Some(residual) = result.residual {
            plan = LogicalPlan::Filter {
                input: Box::new(plan),
                predicate: residual,
            };
        }
        Ok(plan)
    }
}

impl OptimizerRule for CostedIndexScan {
    fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        if !self.config.enabled {
            return Ok(plan);
        }
        self.rewrite(plan)
    }

    fn name(&self) -> &str {
        "costed_index_scan"
    }
}
