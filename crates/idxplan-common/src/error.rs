//! idxplan error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdxError {
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Statistics provider error: {0}")]
    Stats(String),

    #[error("Invalid value type: {0}")]
    InvalidValueType(String),

    #[error("Invalid GIS data: {0}")]
    InvalidGisData(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl IdxError {
    /// Errors that only rule out the current index scan. The caller keeps
    /// the original table scan and carries on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IdxError::InvalidValueType(_) | IdxError::InvalidGisData(_))
    }
}

pub type Result<T> = std::result::Result<T, IdxError>;
