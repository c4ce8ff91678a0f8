//! Key generation, timestamp authorities and token verification for notary.
//!
//! This crate provides:
//! - Per-user key file generation (OpenSSL RSA or native Ed25519)
//! - Timestamp authorities: RFC 3161 over HTTP, an external UPKI command,
//!   and an in-process Ed25519 authority
//! - Token verification via `openssl ts -verify` or natively

pub mod authority;
pub mod command;
pub mod crypto;
pub mod error;
pub mod key;
pub mod request;
pub mod token;

pub use authority::{HttpAuthority, LocalAuthority, TimestampAuthority, UpkiAuthority};
pub use crypto::{NativeCrypto, OpensslCrypto, TimestampCrypto, Verification};
pub use error::{SignerError, SignerResult};
pub use key::{KeyFiles, KeyGenerator, KeyPair, NativeKeyGenerator, OpensslKeyGenerator, PublicKey};
pub use request::{FileDigest, digest_file};

use notary_core::config::{AuthorityConfig, TimestampConfig, VerifierConfig};
use std::sync::Arc;
use std::time::Duration;

/// Everything needed to issue and check tokens.
#[derive(Clone)]
pub struct TimestampBackend {
    pub authority: Arc<dyn TimestampAuthority>,
    pub crypto: Arc<dyn TimestampCrypto>,
    pub keygen: Arc<dyn KeyGenerator>,
}

/// Build the authority, verifier and key generator from configuration.
///
/// A local authority is always trusted by the native verifier.
pub async fn from_config(config: &TimestampConfig) -> SignerResult<TimestampBackend> {
    config.validate().map_err(SignerError::Config)?;

    let mut local_key = None;
    let authority: Arc<dyn TimestampAuthority> = match &config.authority {
        AuthorityConfig::Tsa { url, timeout_secs } => {
            Arc::new(HttpAuthority::new(url, Duration::from_secs(*timeout_secs))?)
        }
        AuthorityConfig::Upki { command, args } => {
            Arc::new(UpkiAuthority::new(command.clone(), args.clone()))
        }
        AuthorityConfig::Local { key_path, key_name } => {
            let local = LocalAuthority::load_or_generate(key_path.as_ref(), key_name).await?;
            local_key = Some(local.public_key());
            Arc::new(local)
        }
    };

    let crypto: Arc<dyn TimestampCrypto> = match &config.verifier {
        VerifierConfig::Openssl {
            binary,
            root_cert,
            untrusted,
        } => Arc::new(OpensslCrypto::new(
            binary.clone(),
            root_cert.clone(),
            untrusted.clone(),
        )),
        VerifierConfig::Native { public_keys } => {
            let mut native = NativeCrypto::from_public_keys(public_keys)?;
            if let Some(encoded) = local_key {
                let (name, key) = PublicKey::parse(&encoded)?;
                native.trust(name, key);
            }
            Arc::new(native)
        }
    };

    tracing::debug!(
        authority = authority.name(),
        verifier = crypto.name(),
        "timestamp backend ready"
    );

    Ok(TimestampBackend {
        authority,
        crypto,
        keygen: key::generator_from_config(&config.key_generator),
    })
}
