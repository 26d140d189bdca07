//! Content fingerprints used to detect file changes between polls.
//!
//! This is a change detector only. The offline embedder hashes text too, but
//! for a different purpose and on its own.

use sha2::{Digest, Sha256};
use std::path::Path;

/// SHA-256 hex digest of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Read `path` and fingerprint its raw bytes.
pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(fingerprint(&bytes))
}
