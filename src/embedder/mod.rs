//! Embedding capability: text in, fixed-length vector out.
//!
//! The index only ever talks to [`Embedder`]. Backends are picked once at
//! construction time by [`build_embedder`]:
//! - [`HashEmbedder`]: deterministic offline fallback (tests, air-gapped use)
//! - [`LocalEmbedder`]: on-device Qwen3 model via fastembed's candle backend
//! - [`OpenAiEmbedder`]: OpenAI-compatible `/embeddings` endpoint

mod hash;
mod local;
mod openai;

pub use hash::HashEmbedder;
pub use local::LocalEmbedder;
pub use openai::OpenAiEmbedder;

use std::sync::Arc;
use tracing::info;

use crate::config::{EmbedderConfig, EmbedderKind};
use crate::error::AppResult;

pub trait Embedder: Send + Sync {
    /// Model identifier, e.g. `"text-embedding-3-small"`.
    fn model_name(&self) -> &str;

    /// Length of every vector this embedder returns.
    fn dimensions(&self) -> usize;

    /// False while a lazily loaded model has not been loaded yet.
    fn is_ready(&self) -> bool {
        true
    }

    fn embed(&self, text: &str) -> AppResult<Vec<f32>>;

    /// Embed a batch; output order matches input order.
    fn embed_many(&self, texts: &[&str]) -> AppResult<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Embed a search query. Backends that are instruction-aware override
    /// this; everyone else embeds queries and documents the same way.
    fn embed_query(&self, query: &str) -> AppResult<Vec<f32>> {
        self.embed(query)
    }
}

/// Construct the configured backend.
///
/// The OpenAI backend owns a blocking HTTP client, so call this outside of
/// an async context.
pub fn build_embedder(config: &EmbedderConfig) -> AppResult<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.kind {
        EmbedderKind::Hash => Arc::new(HashEmbedder::new(config.hash_dimensions)),
        EmbedderKind::Local => Arc::new(LocalEmbedder::new()),
        EmbedderKind::OpenAi => Arc::new(OpenAiEmbedder::from_config(&config.openai)?),
    };
    info!(
        model = embedder.model_name(),
        dimensions = embedder.dimensions(),
        "Embedding backend selected"
    );
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpenAiConfig;

    fn config(kind: EmbedderKind) -> EmbedderConfig {
        EmbedderConfig {
            kind,
            hash_dimensions: 64,
            openai: OpenAiConfig {
                api_key: None,
                base_url: "http://localhost:1".to_string(),
                model: "text-embedding-3-small".to_string(),
                dimensions: None,
                timeout_secs: 1,
            },
        }
    }

    #[test]
    fn test_build_hash_backend() {
        let embedder = build_embedder(&config(EmbedderKind::Hash)).unwrap();
        assert_eq!(embedder.dimensions(), 64);
        assert_eq!(embedder.embed("x").unwrap().len(), 64);
    }

    #[test]
    fn test_openai_backend_requires_key() {
        assert!(build_embedder(&config(EmbedderKind::OpenAi)).is_err());
    }

    #[test]
    fn test_default_batch_and_query_match_single_embed() {
        let embedder = HashEmbedder::new(32);
        let batch = embedder.embed_many(&["a", "b"]).unwrap();
        assert_eq!(batch[0], embedder.embed("a").unwrap());
        assert_eq!(batch[1], embedder.embed("b").unwrap());
        assert_eq!(embedder.embed_query("a").unwrap(), batch[0]);
    }
}
