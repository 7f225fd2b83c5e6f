//! idxplan Catalog - Tables, indexes and statistics

pub mod fds;
pub mod in_memory;
pub mod index;
pub mod stats;
pub mod traits;

pub use fds::FuncDepSet;
pub use in_memory::{InMemoryCatalog, InMemorySchema};
pub use index::{IndexClass, IndexColumn, IndexDef};
pub use stats::{HistogramBucket, StatQualifier, Statistic, TableStatistics};
pub use traits::{CatalogProvider, SchemaProvider, StatsProvider, TableEntry};
