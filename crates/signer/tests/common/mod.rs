//! Shared helpers for signer integration tests.

#![allow(dead_code)]

use std::net::TcpListener;
use std::path::PathBuf;
use tempfile::TempDir;

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// A scratch directory holding one file with `content`.
pub fn scratch_with_file(content: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("data.bin");
    std::fs::write(&file, content).unwrap();
    (dir, file)
}
