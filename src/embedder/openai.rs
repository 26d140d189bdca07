//! OpenAI-compatible embeddings over a blocking HTTP client.
//!
//! No retries here: a failed call surfaces as [`AppError::Embedding`] and the
//! caller decides what to do (the indexer skips the file).

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::config::OpenAiConfig;
use crate::error::{AppError, AppResult};

/// Inputs per request.
const MAX_BATCH: usize = 64;

pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
}

impl OpenAiEmbedder {
    pub fn from_config(config: &OpenAiConfig) -> AppResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Embedding("missing OpenAI API key (OPENAI_API_KEY)".into()))?;
        if config.model.trim().is_empty() {
            return Err(AppError::Embedding("missing OpenAI model name".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| AppError::Embedding("invalid OpenAI API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Embedding(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    fn request_batch(&self, inputs: &[&str]) -> AppResult<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| AppError::Embedding(format!("embeddings request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(AppError::Embedding(format!(
                "embeddings request failed ({}): {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .map_err(|e| AppError::Embedding(format!("failed to parse embedding response: {}", e)))?;
        order_embeddings(parsed, inputs.len())
    }
}

/// Sort by `index` and check we got exactly one vector per input.
fn order_embeddings(mut parsed: EmbeddingResponse, expected: usize) -> AppResult<Vec<Vec<f32>>> {
    parsed.data.sort_by_key(|entry| entry.index);
    if parsed.data.len() != expected {
        return Err(AppError::Embedding(format!(
            "endpoint returned {} embeddings for {} inputs",
            parsed.data.len(),
            expected
        )));
    }
    Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
}

impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions.unwrap_or(match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        })
    }

    fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.request_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("endpoint returned no embedding".into()))
    }

    fn embed_many(&self, texts: &[&str]) -> AppResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            out.extend(self.request_batch(batch)?);
        }
        Ok(out)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
