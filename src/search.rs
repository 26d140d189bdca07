//! Search facade: embed a query, rank stored chunks, attach provenance.

use crate::embedder::Embedder;
use crate::error::AppResult;
use crate::store::{VectorStore, META_END_LINE, META_FILE_PATH, META_START_LINE};
use serde::{Deserialize, Serialize};

pub const DEFAULT_K: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    DEFAULT_K
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub id: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub code: String,
    /// Raw cosine distance; lower is more relevant.
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<CodeSnippet>,
    pub query_time_ms: u64,
}

/// Up to `k` snippets ordered from most to least relevant. Records without
/// file provenance (e.g. added through `add_documents`) come back with an
/// empty path and line 0.
pub fn search_code(
    query: &str,
    k: usize,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
) -> AppResult<Vec<CodeSnippet>> {
    if k == 0 || store.is_empty() {
        return Ok(Vec::new());
    }

    let query_vec = embedder.embed_query(query)?;
    let matches = store.similarity_search(&query_vec, k)?;

    Ok(matches
        .into_iter()
        .map(|m| {
            let line = |key: &str| {
                m.metadata
                    .get(key)
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0)
            };
            CodeSnippet {
                file_path: m.metadata.get(META_FILE_PATH).cloned().unwrap_or_default(),
                start_line: line(META_START_LINE),
                end_line: line(META_END_LINE),
                id: m.id,
                code: m.text,
                score: m.distance,
            }
        })
        .collect())
}

/// [`search_code`] plus timing, as returned by the HTTP surface.
pub fn run_search(
    query: &SearchQuery,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
) -> AppResult<SearchResponse> {
    let start = std::time::Instant::now();
    let results = search_code(&query.query, query.k, store, embedder)?;
    Ok(SearchResponse {
        results,
        query_time_ms: start.elapsed().as_millis() as u64,
    })
}
