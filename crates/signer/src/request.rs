//! File digests.

use crate::error::SignerResult;
use crate::token::to_hex;
use sha2::{Digest, Sha512};
use std::path::Path;
use tokio::io::AsyncReadExt;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// SHA-512 digest of a file's content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDigest {
    pub bytes: Vec<u8>,
    pub size: u64,
}

impl FileDigest {
    pub fn hex(&self) -> String {
        to_hex(&self.bytes)
    }
}

/// Hash a file without loading it into memory.
pub async fn digest_file(path: &Path) -> SignerResult<FileDigest> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok(FileDigest {
        bytes: hasher.finalize().to_vec(),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_digest_matches_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();

        let digest = digest_file(&path).await.unwrap();
        assert_eq!(digest.size, 3);
        assert!(digest.hex().starts_with("ddaf35a193617aba"));
        assert_eq!(digest.hex().len(), 128);
    }

    #[tokio::test]
    async fn test_digest_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = digest_file(&dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, crate::SignerError::Io(_)));
    }
}
