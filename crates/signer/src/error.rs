//! Signer error types.

use thiserror::Error;

/// Key generation, stamping and verification errors.
///
/// A token that simply does not match its file is not an error; see
/// [`crate::crypto::Verification::Invalid`].
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("key generation error: {0}")]
    KeyGeneration(String),

    #[error("key parsing error: {0}")]
    KeyParsing(String),

    #[error("timestamp authority error (status {status:?}): {message}")]
    Authority { status: Option<u16>, message: String },

    #[error("command `{program}` failed: {message}")]
    Command { program: String, message: String },

    #[error("invalid timestamp request: {0}")]
    InvalidRequest(String),

    #[error("no trusted key named {0}")]
    UntrustedKey(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SignerError {
    pub(crate) fn authority(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Authority {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn command(program: &str, message: impl Into<String>) -> Self {
        Self::Command {
            program: program.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for signer operations.
pub type SignerResult<T> = std::result::Result<T, SignerError>;
