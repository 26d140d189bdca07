//! On-device code embedding with Qwen3-Embedding-0.6B (decoder-only LLM
//! embedder, last-token pooling) through fastembed's candle backend.
//! Model weights are fetched from the HuggingFace Hub on first use.

use candle_core::{DType, Device};
use fastembed::Qwen3TextEmbedding;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use super::Embedder;
use crate::error::{AppError, AppResult};

/// The model's `config.hidden_size`.
const EMBEDDING_DIM: usize = 1024;

const QWEN3_REPO_ID: &str = "Qwen/Qwen3-Embedding-0.6B";

/// Qwen3 supports up to 32768 tokens; 8192 balances quality and CPU memory.
/// A 400-line chunk fits comfortably.
const QWEN3_MAX_LENGTH: usize = 8192;

/// Decoder-only models are heavier per token than encoders, keep batches small.
const EMBED_BATCH_SIZE: usize = 32;

/// Queries get an instruction prefix, documents are embedded raw.
const QUERY_INSTRUCTION: &str = "Instruct: Retrieve semantically similar source code or documentation\nQuery: ";

pub struct LocalEmbedder {
    /// `embed()` takes `&self` but the tokenizer is not Sync.
    model: Mutex<Option<Qwen3TextEmbedding>>,
    initialized: AtomicBool,
}

impl LocalEmbedder {
    pub fn new() -> Self {
        Self {
            model: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    fn load_model() -> AppResult<Qwen3TextEmbedding> {
        info!(
            "Initializing Qwen3-Embedding-0.6B ({}, {}d, max_len={})...",
            QWEN3_REPO_ID, EMBEDDING_DIM, QWEN3_MAX_LENGTH
        );

        let model = Qwen3TextEmbedding::from_hf(
            QWEN3_REPO_ID,
            &Device::Cpu,
            DType::F32,
            QWEN3_MAX_LENGTH,
        )
        .map_err(|e| AppError::Embedding(format!("Failed to init Qwen3 embedding model: {}", e)))?;

        let actual_dim = model.config().hidden_size;
        if actual_dim != EMBEDDING_DIM {
            return Err(AppError::Embedding(format!(
                "Model dimension mismatch: expected {} but got {}",
                EMBEDDING_DIM, actual_dim
            )));
        }

        info!("Qwen3-Embedding-0.6B ready ({}d, candle CPU)", EMBEDDING_DIM);
        Ok(model)
    }

    fn run_batches(&self, texts: Vec<String>) -> AppResult<Vec<Vec<f32>>> {
        let mut guard = self.model.lock();
        if guard.is_none() {
            *guard = Some(Self::load_model()?);
            self.initialized.store(true, Ordering::Release);
        }
        let model = guard
            .as_ref()
            .ok_or_else(|| AppError::Embedding("Embedding model not initialized".into()))?;

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let batch = batch.to_vec();
            let vectors = model
                .embed(&batch)
                .map_err(|e| AppError::Embedding(format!("Embedding failed: {}", e)))?;
            if vectors.len() != batch.len() {
                return Err(AppError::Embedding(format!(
                    "Model returned {} embeddings for {} inputs",
                    vectors.len(),
                    batch.len()
                )));
            }
            out.extend(vectors);
        }
        Ok(out)
    }

    fn embed_one(&self, text: String) -> AppResult<Vec<f32>> {
        self.run_batches(vec![text])?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("Model returned no embedding".into()))
    }
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        QWEN3_REPO_ID
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    fn is_ready(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embed_one(text.to_string())
    }

    fn embed_many(&self, texts: &[&str]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run_batches(texts.iter().map(|t| t.to_string()).collect())
    }

    fn embed_query(&self, query: &str) -> AppResult<Vec<f32>> {
        self.embed_one(format!("{}{}", QUERY_INSTRUCTION, query))
    }
}
