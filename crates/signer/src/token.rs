//! Tokens issued by the in-process authority.
//!
//! Requests and tokens are small JSON documents. The signature covers a
//! line-oriented fingerprint, so the JSON encoding itself is not signed.

use crate::error::{SignerError, SignerResult};
use crate::key::{KeyPair, PublicKey};
use base64::Engine;
use ed25519_dalek::{Signer as _, Verifier as _};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Hash algorithm name used in requests and tokens.
pub const HASH_ALG: &str = "sha512";

/// A timestamp request for one file digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRequest {
    pub hash_alg: String,
    /// Hex-encoded digest.
    pub digest: String,
    pub nonce: u64,
}

impl LocalRequest {
    pub fn to_bytes(&self) -> SignerResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SignerError::InvalidRequest(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> SignerResult<Self> {
        let request: Self = serde_json::from_slice(bytes)
            .map_err(|e| SignerError::InvalidRequest(e.to_string()))?;
        if request.hash_alg != HASH_ALG {
            return Err(SignerError::InvalidRequest(format!(
                "unsupported hash algorithm {}",
                request.hash_alg
            )));
        }
        if request.digest.is_empty() {
            return Err(SignerError::InvalidRequest("empty digest".to_string()));
        }
        Ok(request)
    }
}

/// A signed statement that a digest existed at `gen_time`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalToken {
    pub hash_alg: String,
    pub digest: String,
    pub nonce: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub gen_time: OffsetDateTime,
    pub key_name: String,
    /// Base64 Ed25519 signature over [`LocalToken::fingerprint`].
    pub signature: String,
}

impl LocalToken {
    /// Sign `request` at the current time.
    pub fn issue(request: &LocalRequest, keypair: &KeyPair) -> Self {
        let mut token = Self {
            hash_alg: request.hash_alg.clone(),
            digest: request.digest.clone(),
            nonce: request.nonce,
            gen_time: OffsetDateTime::now_utc(),
            key_name: keypair.name.clone(),
            signature: String::new(),
        };
        let sig = keypair
            .secret
            .signing_key()
            .sign(token.fingerprint().as_bytes());
        token.signature = B64.encode(sig.to_bytes());
        token
    }

    /// The signed content.
    pub fn fingerprint(&self) -> String {
        format!(
            "notary-tst;1;{};{};{};{}",
            self.hash_alg,
            self.digest,
            self.nonce,
            self.gen_time.unix_timestamp_nanos()
        )
    }

    /// Whether the signature was made by `key`.
    pub fn signature_valid(&self, key: &PublicKey) -> bool {
        let Ok(bytes) = B64.decode(&self.signature) else {
            return false;
        };
        let Ok(array) = <[u8; 64]>::try_from(bytes.as_slice()) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&array);
        key.verifying_key()
            .verify(self.fingerprint().as_bytes(), &signature)
            .is_ok()
    }

    pub fn to_bytes(&self) -> SignerResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SignerError::InvalidRequest(e.to_string()))
    }

    /// Parse a stored token. `None` when the bytes are not a token at all.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

/// Lowercase hex encoding.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
