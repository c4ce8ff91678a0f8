//! Gateway error types.

use thiserror::Error;

/// Storage gateway and change-feed errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Non-200 response or an envelope without `data`. Never means "file absent".
    #[error("gateway unavailable (status {status:?}): {message}")]
    Unavailable { status: Option<u16>, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn unavailable(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            status,
            message: message.into(),
        }
    }

    /// Whether the gateway answered 404. Callers still treat this as
    /// "could not check", not as proof of deletion.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Unavailable { status: Some(404), .. })
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
