//! idxplan common - Shared errors, configuration and id sets

pub mod bitset;
pub mod config;
pub mod error;

pub use bitset::IdSet;
pub use config::CosterConfig;
pub use error::{IdxError, Result};
