//! Timestamp request building and token verification.

use crate::command;
use crate::error::{SignerError, SignerResult};
use crate::key::PublicKey;
use crate::request::digest_file;
use crate::token::{HASH_ALG, LocalRequest, LocalToken};
use async_trait::async_trait;
use rand_core::RngCore;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Outcome of checking a token against a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verification {
    /// The token covers the file's current content.
    Valid,
    /// The token does not match, with the verifier's reason.
    Invalid(String),
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Request building and token verification for one token format.
///
/// `verify` returns `Err` only when the check itself could not run; a token
/// that fails the check is `Ok(Verification::Invalid)`.
#[async_trait]
pub trait TimestampCrypto: Send + Sync {
    async fn build_request(&self, file: &Path, scratch: &Path) -> SignerResult<Vec<u8>>;

    async fn verify(&self, file: &Path, token: &[u8], scratch: &Path) -> SignerResult<Verification>;

    fn name(&self) -> &'static str;
}

/// `openssl ts` against a trusted root certificate.
pub struct OpensslCrypto {
    binary: String,
    root_cert: PathBuf,
    untrusted: Option<PathBuf>,
}

impl OpensslCrypto {
    pub fn new(binary: impl Into<String>, root_cert: PathBuf, untrusted: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            root_cert,
            untrusted,
        }
    }
}

#[async_trait]
impl TimestampCrypto for OpensslCrypto {
    async fn build_request(&self, file: &Path, scratch: &Path) -> SignerResult<Vec<u8>> {
        let out = scratch.join("request.tsq");
        command::run_checked(
            &self.binary,
            [
                OsStr::new("ts"),
                OsStr::new("-query"),
                OsStr::new("-data"),
                file.as_os_str(),
                OsStr::new("-sha512"),
                OsStr::new("-cert"),
                OsStr::new("-out"),
                out.as_os_str(),
            ],
        )
        .await?;
        Ok(tokio::fs::read(&out).await?)
    }

    async fn verify(&self, file: &Path, token: &[u8], scratch: &Path) -> SignerResult<Verification> {
        let token_path = scratch.join("token.tsr");
        tokio::fs::write(&token_path, token).await?;

        let mut args = vec![
            OsStr::new("ts"),
            OsStr::new("-verify"),
            OsStr::new("-data"),
            file.as_os_str(),
            OsStr::new("-in"),
            token_path.as_os_str(),
            OsStr::new("-CAfile"),
            self.root_cert.as_os_str(),
        ];
        if let Some(untrusted) = &self.untrusted {
            args.push(OsStr::new("-untrusted"));
            args.push(untrusted.as_os_str());
        }

        // `ts -verify` exits non-zero on a mismatch, so the exit status alone
        // cannot tell a bad token from a failed run.
        let output = command::run(&self.binary, args).await?;
        parse_verify_output(&self.binary, &output.combined())
    }

    fn name(&self) -> &'static str {
        "openssl"
    }
}

fn parse_verify_output(program: &str, output: &str) -> SignerResult<Verification> {
    if output.contains("Verification: OK") {
        return Ok(Verification::Valid);
    }
    if output.contains("Verification: FAILED") {
        let reason = output
            .lines()
            .find(|line| line.contains("error") || line.contains("mismatch"))
            .unwrap_or("verification failed")
            .trim()
            .to_string();
        return Ok(Verification::Invalid(reason));
    }
    Err(SignerError::command(
        program,
        format!("unrecognized verify output: {}", output.trim()),
    ))
}

/// Native verification of tokens from the local authority.
pub struct NativeCrypto {
    trusted: Vec<(String, PublicKey)>,
}

impl NativeCrypto {
    pub fn new(trusted: Vec<(String, PublicKey)>) -> Self {
        Self { trusted }
    }

    /// Parse trusted keys in `name:base64` form.
    pub fn from_public_keys(keys: &[String]) -> SignerResult<Self> {
        let trusted = keys
            .iter()
            .map(|k| PublicKey::parse(k))
            .collect::<SignerResult<Vec<_>>>()?;
        Ok(Self::new(trusted))
    }

    pub fn trust(&mut self, name: impl Into<String>, key: PublicKey) {
        self.trusted.push((name.into(), key));
    }

    pub fn is_empty(&self) -> bool {
        self.trusted.is_empty()
    }
}

#[async_trait]
impl TimestampCrypto for NativeCrypto {
    async fn build_request(&self, file: &Path, _scratch: &Path) -> SignerResult<Vec<u8>> {
        let digest = digest_file(file).await?;
        LocalRequest {
            hash_alg: HASH_ALG.to_string(),
            digest: digest.hex(),
            nonce: rand_core::OsRng.next_u64(),
        }
        .to_bytes()
    }

    async fn verify(&self, file: &Path, token: &[u8], _scratch: &Path) -> SignerResult<Verification> {
        let Some(token) = LocalToken::from_bytes(token) else {
            return Ok(Verification::Invalid("token is not readable".to_string()));
        };
        let (_, key) = self
            .trusted
            .iter()
            .find(|(name, _)| *name == token.key_name)
            .ok_or_else(|| SignerError::UntrustedKey(token.key_name.clone()))?;

        if !token.signature_valid(key) {
            return Ok(Verification::Invalid("signature does not verify".to_string()));
        }
        if token.hash_alg != HASH_ALG {
            return Ok(Verification::Invalid(format!(
                "unsupported hash algorithm {}",
                token.hash_alg
            )));
        }

        let digest = digest_file(file).await?;
        if digest.hex() != token.digest {
            return Ok(Verification::Invalid("message imprint mismatch".to_string()));
        }
        Ok(Verification::Valid)
    }

    fn name(&self) -> &'static str {
        "native"
    }
}
