//! Key material: Ed25519 key types and per-user key file generation.

use crate::command;
use crate::error::{SignerError, SignerResult};
use async_trait::async_trait;
use base64::Engine;
use ed25519_dalek::{SigningKey, VerifyingKey};
use notary_core::config::KeyGeneratorConfig;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

fn split_named(s: &str) -> SignerResult<(&str, Vec<u8>)> {
    let (name, b64) = s
        .trim()
        .split_once(':')
        .ok_or_else(|| SignerError::KeyParsing("expected 'name:base64' format".to_string()))?;
    if name.is_empty() {
        return Err(SignerError::KeyParsing("key name is empty".to_string()));
    }
    let bytes = B64
        .decode(b64)
        .map_err(|e| SignerError::KeyParsing(format!("invalid base64: {e}")))?;
    Ok((name, bytes))
}

/// Ed25519 signing key.
pub struct SecretKey {
    inner: SigningKey,
}

impl SecretKey {
    pub fn generate() -> Self {
        let mut rng = rand_core::OsRng;
        Self {
            inner: SigningKey::generate(&mut rng),
        }
    }

    /// Parse `name:base64(secret || public)`.
    pub fn parse(s: &str) -> SignerResult<(String, Self)> {
        let (name, bytes) = split_named(s)?;
        if bytes.len() != 64 {
            return Err(SignerError::KeyParsing(format!(
                "expected 64 bytes, got {}",
                bytes.len()
            )));
        }
        let secret: [u8; 32] = bytes[..32]
            .try_into()
            .map_err(|_| SignerError::KeyParsing("invalid secret key bytes".to_string()))?;
        let inner = SigningKey::from_bytes(&secret);
        if inner.verifying_key().as_bytes() != &bytes[32..] {
            return Err(SignerError::KeyParsing(
                "public half does not match secret key".to_string(),
            ));
        }
        Ok((name.to_string(), Self { inner }))
    }

    pub fn encode(&self, key_name: &str) -> String {
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(self.inner.as_bytes());
        bytes.extend_from_slice(self.inner.verifying_key().as_bytes());
        format!("{key_name}:{}", B64.encode(&bytes))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.inner
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED])")
    }
}

/// Ed25519 verifying key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Parse `name:base64(public)`.
    pub fn parse(s: &str) -> SignerResult<(String, Self)> {
        let (name, bytes) = split_named(s)?;
        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            SignerError::KeyParsing(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        let inner = VerifyingKey::from_bytes(&key)
            .map_err(|e| SignerError::KeyParsing(format!("invalid public key: {e}")))?;
        Ok((name.to_string(), Self { inner }))
    }

    pub fn encode(&self, key_name: &str) -> String {
        format!("{key_name}:{}", B64.encode(self.inner.as_bytes()))
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.inner
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = B64.encode(self.inner.as_bytes());
        write!(f, "PublicKey({}...)", &b64[..8])
    }
}

/// A named Ed25519 keypair.
pub struct KeyPair {
    pub name: String,
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl KeyPair {
    pub fn generate(name: impl Into<String>) -> Self {
        let secret = SecretKey::generate();
        let public = secret.public_key();
        Self {
            name: name.into(),
            secret,
            public,
        }
    }

    pub fn parse(s: &str) -> SignerResult<Self> {
        let (name, secret) = SecretKey::parse(s)?;
        let public = secret.public_key();
        Ok(Self {
            name,
            secret,
            public,
        })
    }

    pub fn encode_secret(&self) -> String {
        self.secret.encode(&self.name)
    }

    pub fn encode_public(&self) -> String {
        self.public.encode(&self.name)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("name", &self.name)
            .field("public", &self.public)
            .finish()
    }
}

// =============================================================================
// Per-user key files
// =============================================================================

/// Paths of a generated key pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyFiles {
    pub private_path: PathBuf,
    pub public_path: PathBuf,
}

impl KeyFiles {
    /// Where the files for `key_name` live inside `key_dir`.
    pub fn locate(key_dir: &Path, key_name: &str) -> SignerResult<Self> {
        if key_name.is_empty()
            || key_name.contains(['/', '\\'])
            || key_name.starts_with('.')
        {
            return Err(SignerError::KeyGeneration(format!(
                "unusable key name: {key_name:?}"
            )));
        }
        Ok(Self {
            private_path: key_dir.join(format!("{key_name}.key")),
            public_path: key_dir.join(format!("{key_name}.pub")),
        })
    }
}

/// Produces a private key file and the matching public key file.
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    /// Write a new key pair named `key_name` into `key_dir`.
    ///
    /// Not transactional: a failure after the private key is written leaves
    /// it behind.
    async fn generate(&self, key_dir: &Path, key_name: &str) -> SignerResult<KeyFiles>;

    fn algorithm(&self) -> &'static str;
}

/// RSA keys via `openssl genrsa` and `openssl rsa -pubout`.
pub struct OpensslKeyGenerator {
    binary: String,
    bits: u32,
}

impl OpensslKeyGenerator {
    pub fn new(binary: impl Into<String>, bits: u32) -> Self {
        Self {
            binary: binary.into(),
            bits,
        }
    }
}

#[async_trait]
impl KeyGenerator for OpensslKeyGenerator {
    async fn generate(&self, key_dir: &Path, key_name: &str) -> SignerResult<KeyFiles> {
        let files = KeyFiles::locate(key_dir, key_name)?;
        tokio::fs::create_dir_all(key_dir).await?;

        let bits = self.bits.to_string();
        let private = files.private_path.as_os_str();
        let public = files.public_path.as_os_str();
        command::run_checked(
            &self.binary,
            [OsStr::new("genrsa"), OsStr::new("-out"), private, OsStr::new(&bits)],
        )
        .await
        .map_err(|e| SignerError::KeyGeneration(e.to_string()))?;

        command::run_checked(
            &self.binary,
            [
                OsStr::new("rsa"),
                OsStr::new("-in"),
                private,
                OsStr::new("-pubout"),
                OsStr::new("-out"),
                public,
            ],
        )
        .await
        .map_err(|e| SignerError::KeyGeneration(e.to_string()))?;

        Ok(files)
    }

    fn algorithm(&self) -> &'static str {
        "rsa"
    }
}

/// Ed25519 key files in `name:base64` form.
#[derive(Default)]
pub struct NativeKeyGenerator;

#[async_trait]
impl KeyGenerator for NativeKeyGenerator {
    async fn generate(&self, key_dir: &Path, key_name: &str) -> SignerResult<KeyFiles> {
        let files = KeyFiles::locate(key_dir, key_name)?;
        tokio::fs::create_dir_all(key_dir).await?;

        let keypair = KeyPair::generate(key_name);
        write_private(&files.private_path, &keypair.encode_secret()).await?;
        tokio::fs::write(&files.public_path, format!("{}\n", keypair.encode_public())).await?;
        Ok(files)
    }

    fn algorithm(&self) -> &'static str {
        "ed25519"
    }
}

/// Write a private key readable only by the owner.
pub(crate) async fn write_private(path: &Path, contents: &str) -> SignerResult<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    tokio::io::AsyncWriteExt::write_all(&mut file, format!("{contents}\n").as_bytes()).await?;
    tokio::io::AsyncWriteExt::flush(&mut file).await?;
    Ok(())
}

/// Create the key generator selected by configuration.
pub fn generator_from_config(config: &KeyGeneratorConfig) -> Arc<dyn KeyGenerator> {
    match config {
        KeyGeneratorConfig::Openssl { binary, bits } => {
            Arc::new(OpensslKeyGenerator::new(binary.clone(), *bits))
        }
        KeyGeneratorConfig::Native => Arc::new(NativeKeyGenerator),
    }
}
