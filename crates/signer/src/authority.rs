//! Timestamp authorities.

use crate::command;
use crate::error::{SignerError, SignerResult};
use crate::key::{KeyPair, write_private};
use crate::token::{LocalRequest, LocalToken};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Content type of an RFC 3161 request.
pub const TIMESTAMP_QUERY: &str = "application/timestamp-query";
/// Content type of an RFC 3161 response.
pub const TIMESTAMP_REPLY: &str = "application/timestamp-reply";

/// Issues a token for a file.
#[async_trait]
pub trait TimestampAuthority: Send + Sync {
    /// Obtain a token. `request` was built from `file` by the configured
    /// [`crate::TimestampCrypto`]; `scratch` is a private working directory.
    /// The returned bytes are stored as-is.
    async fn stamp(&self, request: &[u8], file: &Path, scratch: &Path) -> SignerResult<Vec<u8>>;

    fn name(&self) -> &'static str;
}

/// RFC 3161 authority reached over HTTP.
pub struct HttpAuthority {
    http: reqwest::Client,
    url: String,
}

impl HttpAuthority {
    pub fn new(url: &str, timeout: Duration) -> SignerResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl TimestampAuthority for HttpAuthority {
    async fn stamp(&self, request: &[u8], _file: &Path, _scratch: &Path) -> SignerResult<Vec<u8>> {
        let response = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, TIMESTAMP_QUERY)
            .header(ACCEPT, TIMESTAMP_REPLY)
            .body(request.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SignerError::authority(Some(status.as_u16()), body));
        }
        let token = response.bytes().await?;
        if token.is_empty() {
            return Err(SignerError::authority(Some(200), "empty token"));
        }
        Ok(token.to_vec())
    }

    fn name(&self) -> &'static str {
        "tsa"
    }
}

/// External signing command. Arguments may reference `{file}` (the file being
/// stamped) and `{output}` (where the command must write the token).
pub struct UpkiAuthority {
    command: String,
    args: Vec<String>,
}

impl UpkiAuthority {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl TimestampAuthority for UpkiAuthority {
    async fn stamp(&self, _request: &[u8], file: &Path, scratch: &Path) -> SignerResult<Vec<u8>> {
        let output = scratch.join("token.tst");
        let file_arg = file.to_string_lossy();
        let output_arg = output.to_string_lossy();
        let args = command::substitute(
            &self.args,
            &[("file", file_arg.as_ref()), ("output", output_arg.as_ref())],
        );

        command::run_checked(&self.command, &args).await?;

        let token = tokio::fs::read(&output).await.map_err(|e| {
            SignerError::command(&self.command, format!("no token written to {}: {e}", output.display()))
        })?;
        if token.is_empty() {
            return Err(SignerError::command(&self.command, "empty token"));
        }
        Ok(token)
    }

    fn name(&self) -> &'static str {
        "upki"
    }
}

/// In-process Ed25519 authority.
pub struct LocalAuthority {
    keypair: KeyPair,
}

impl LocalAuthority {
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// Load the signing key from `key_path`, generating it there on first use.
    /// Without a path the key lives only as long as the process.
    pub async fn load_or_generate(key_path: Option<&PathBuf>, key_name: &str) -> SignerResult<Self> {
        let Some(path) = key_path else {
            tracing::warn!(key_name = %key_name, "local timestamp authority uses an ephemeral key");
            return Ok(Self::new(KeyPair::generate(key_name)));
        };

        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Self::new(KeyPair::parse(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let keypair = KeyPair::generate(key_name);
                write_private(path, &keypair.encode_secret()).await?;
                tracing::info!(
                    key_name = %key_name,
                    path = %path.display(),
                    "generated local timestamp authority key"
                );
                Ok(Self::new(keypair))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Public key in `name:base64` form, for verifier trust lists.
    pub fn public_key(&self) -> String {
        self.keypair.encode_public()
    }
}

#[async_trait]
impl TimestampAuthority for LocalAuthority {
    async fn stamp(&self, request: &[u8], _file: &Path, _scratch: &Path) -> SignerResult<Vec<u8>> {
        let request = LocalRequest::from_bytes(request)?;
        LocalToken::issue(&request, &self.keypair).to_bytes()
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
