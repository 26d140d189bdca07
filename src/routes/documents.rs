use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::blocking;
use crate::error::{AppError, AppResult};
use crate::store::{Metadata, Record};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddDocumentsRequest {
    pub texts: Vec<String>,
    /// Precomputed vectors; embedded with the configured backend when absent.
    #[serde(default)]
    pub embeddings: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Metadata>>,
}

#[derive(Debug, Serialize)]
pub struct AddDocumentsResponse {
    pub ids: Vec<String>,
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Record>> {
    state
        .store
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::DocumentNotFound(id))
}

pub async fn add_documents(
    State(state): State<AppState>,
    Json(req): Json<AddDocumentsRequest>,
) -> AppResult<Json<AddDocumentsResponse>> {
    let count = req.texts.len();
    let metadatas = req
        .metadatas
        .unwrap_or_else(|| vec![Metadata::new(); count]);

    let store = state.store.clone();
    let embedder = state.embedder.clone();
    let ids = blocking(move || {
        let embeddings = match req.embeddings {
            Some(embeddings) => embeddings,
            None => {
                let texts: Vec<&str> = req.texts.iter().map(String::as_str).collect();
                embedder.embed_many(&texts)?
            }
        };
        store.add_documents(req.texts, embeddings, metadatas)
    })
    .await?;

    info!(count = ids.len(), "Documents added");
    Ok(Json(AddDocumentsResponse { ids }))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let store = state.store.clone();
    let target = id.clone();
    let deleted = blocking(move || store.delete(&target)).await?;
    if !deleted {
        return Err(AppError::DocumentNotFound(id));
    }

    info!(id = %id, "Document deleted");
    Ok(Json(json!({
        "success": true,
        "id": id,
    })))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_util::{get, post_json, send};
    use crate::server::create_app;
    use crate::state::tests::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_add_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(dir.path()));

        let (status, body) = send(
            &app,
            post_json(
                "/api/documents",
                json!({"texts": ["alpha", "beta"], "metadatas": [{"tag": "a"}, {}]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<String> = serde_json::from_value(body["ids"].clone()).unwrap();
        assert_eq!(ids.len(), 2);

        let (status, body) = send(&app, get(&format!("/api/documents/{}", ids[0]))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "alpha");
        assert_eq!(body["metadata"]["tag"], "a");
        assert_eq!(body["embedding"].as_array().unwrap().len(), 16);

        let delete = Request::delete(format!("/api/documents/{}", ids[0]))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, delete).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, get(&format!("/api/documents/{}", ids[0]))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(dir.path()));

        let (status, _) = send(
            &app,
            post_json("/api/documents", json!({"texts": ["a"], "embeddings": [[1.0, 0.0]]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            post_json("/api/documents", json!({"texts": ["b"], "embeddings": [[1.0]]})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["status"], 422);
    }

    #[tokio::test]
    async fn test_mismatched_lengths_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(dir.path()));
        let (status, _) = send(
            &app,
            post_json("/api/documents", json!({"texts": ["a", "b"], "metadatas": [{}]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
