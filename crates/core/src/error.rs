//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid provider: {0}")]
    InvalidProvider(String),

    #[error("invalid inspection status code: {0}")]
    InvalidStatus(i64),

    #[error("invalid storage type code: {0}")]
    InvalidStorageType(i64),

    #[error("invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
