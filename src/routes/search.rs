use axum::{extract::State, Json};
use tracing::debug;

use super::blocking;
use crate::error::{AppError, AppResult};
use crate::search::{run_search, SearchQuery, SearchResponse};
use crate::state::AppState;

/// Largest `k` a single request may ask for.
const MAX_K: usize = 100;

pub async fn search_code(
    State(state): State<AppState>,
    Json(query): Json<SearchQuery>,
) -> AppResult<Json<SearchResponse>> {
    if query.query.trim().is_empty() {
        return Err(AppError::BadRequest("query must not be empty".into()));
    }
    let query = SearchQuery {
        k: query.k.min(MAX_K),
        ..query
    };

    let store = state.store.clone();
    let embedder = state.embedder.clone();
    let response = blocking(move || run_search(&query, store.as_ref(), embedder.as_ref())).await?;

    debug!(
        results = response.results.len(),
        query_time_ms = response.query_time_ms,
        "Search complete"
    );
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_util::{post_json, send};
    use crate::server::create_app;
    use crate::state::tests::test_state;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_search_returns_ranked_snippets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn alpha() {}\n").unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn beta() {}\n").unwrap();
        let state = test_state(dir.path());
        state.indexer.reindex_tree(dir.path()).unwrap();

        let app = create_app(state);
        let (status, body) = send(
            &app,
            post_json("/api/search", json!({"query": "fn beta() {}\n", "k": 1})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0]["file_path"].as_str().unwrap().ends_with("b.rs"));
        assert_eq!(results[0]["start_line"], 1);
        assert_eq!(results[0]["end_line"], 1);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(dir.path()));
        let (status, _) = send(&app, post_json("/api/search", json!({"query": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
