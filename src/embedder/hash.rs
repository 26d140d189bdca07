use sha2::{Digest, Sha256};

use super::Embedder;
use crate::error::AppResult;

pub const DEFAULT_HASH_DIMENSIONS: usize = 128;

/// Deterministic offline embedder.
///
/// The SHA-256 digest of the text is repeated until it fills `dimensions`
/// bytes, and each byte becomes `b / 255.0`. Identical text always gives a
/// bit-identical vector; similarity between different texts carries no
/// meaning.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSIONS)
    }
}

impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "sha256-hash"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let digest = Sha256::digest(text.as_bytes());
        Ok((0..self.dimensions)
            .map(|i| digest[i % digest.len()] as f32 / 255.0)
            .collect())
    }
}
