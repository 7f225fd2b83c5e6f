//! idxplan Planner - Cost-based index selection
//!
//! A filter is flattened once into an [`IndexFilter`] tree, every candidate
//! index is costed against that tree with its statistic, and the winner's
//! ranges and residual filter replace the table scan.

pub mod classify;
pub mod conj;
pub mod coster;
pub mod flatten;
pub mod histogram;
pub mod index_builder;
pub mod index_filter;
pub mod index_scan;
pub mod optimizer;
pub mod range_builder;
pub mod uniform;

pub use classify::{classify, Classified};
pub use conj::ConjCollector;
pub use coster::{compare_candidates, BestCandidate, IndexCoster};
pub use flatten::{Flattened, Flattener};
pub use index_builder::IndexRangeBuilder;
pub use index_filter::{
    format_index_filter, AndNode, ExprArena, ExprId, IndexFilter, IndexLeaf, IndexScanOp,
    OrChild, OrNode,
};
pub use index_scan::{costed_index_scan, CostedIndexScanResult};
pub use optimizer::{CostedIndexScan, Optimizer, OptimizerRule};
pub use range_builder::RangeBuilder;
pub use uniform::{index_fds, uniform_dist_statistic};
