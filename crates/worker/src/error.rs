//! Worker error types.

/// Errors raised by the timestamp, reconciliation and quota services.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("lock held: {0}")]
    LockHeld(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("metadata error: {0}")]
    Metadata(#[from] notary_metadata::MetadataError),

    #[error("gateway error: {0}")]
    Gateway(#[from] notary_gateway::GatewayError),

    #[error("signer error: {0}")]
    Signer(#[from] notary_signer::SignerError),

    #[error("core error: {0}")]
    Core(#[from] notary_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Short machine-readable code, used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidEvent(_) => "invalid_event",
            Self::LockHeld(_) => "lock_held",
            Self::Config(_) => "config_error",
            Self::Metadata(_) => "metadata_error",
            Self::Gateway(_) => "gateway_error",
            Self::Signer(_) => "signer_error",
            Self::Core(_) => "core_error",
            Self::Io(_) => "io_error",
        }
    }
}

/// Result type for worker operations.
pub type WorkerResult<T> = std::result::Result<T, WorkerError>;
