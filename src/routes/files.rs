use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::blocking;
use crate::error::{AppError, AppResult};
use crate::indexer::FileIndexReport;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FilePathRequest {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteFileRequest {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ReadFileResponse {
    pub path: String,
    pub content: String,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct WriteFileResponse {
    pub status: &'static str,
    pub path: String,
    pub size: usize,
    pub index: FileIndexReport,
}

pub async fn read_file(
    State(state): State<AppState>,
    Json(req): Json<FilePathRequest>,
) -> AppResult<Json<ReadFileResponse>> {
    let full_path = state.resolve_path(&req.path)?;

    if !full_path.is_file() {
        warn!(path = %req.path, "File not found");
        return Err(AppError::FileNotFound(req.path));
    }

    let metadata = tokio::fs::metadata(&full_path).await?;
    if metadata.len() > state.config.max_file_size_bytes as u64 {
        warn!(path = %req.path, size = metadata.len(), max = state.config.max_file_size_bytes, "File too large to read");
        return Err(AppError::BadRequest("File too large to read".into()));
    }

    let content = tokio::fs::read_to_string(&full_path).await?;
    Ok(Json(ReadFileResponse {
        path: full_path.to_string_lossy().to_string(),
        content,
        size: metadata.len(),
    }))
}

/// Write a file and re-embed it before answering, so a search issued right
/// after the response already sees the new content.
#[instrument(skip(state, req), fields(path = %req.path))]
pub async fn write_file(
    State(state): State<AppState>,
    Json(req): Json<WriteFileRequest>,
) -> AppResult<Json<WriteFileResponse>> {
    let full_path = state.resolve_path(&req.path)?;

    if let Some(parent) = full_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let size = req.content.len();
    tokio::fs::write(&full_path, &req.content).await?;
    info!(path = %full_path.display(), size, "File written");

    let indexer = state.indexer.clone();
    let target = full_path.clone();
    let index = blocking(move || indexer.reindex_file(&target)).await?;

    Ok(Json(WriteFileResponse {
        status: "written",
        path: full_path.to_string_lossy().to_string(),
        size,
        index,
    }))
}

#[cfg(test)]
mod tests {
    use crate::indexer::Indexer;
    use crate::routes::test_util::{post_json, send};
    use crate::server::create_app;
    use crate::state::tests::test_state;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_then_read_and_reindex() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let store = state.store.clone();
        let app = create_app(state);

        let (status, body) = send(
            &app,
            post_json(
                "/api/files/write",
                json!({"path": "pkg/new.rs", "content": "fn created() {}\n"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "written");
        assert_eq!(body["index"]["chunks"], 1);

        let file_path = body["path"].as_str().unwrap().to_string();
        let record = store.get(&Indexer::chunk_id(&file_path, 0)).unwrap();
        assert_eq!(record.text, "fn created() {}\n");

        let (status, body) =
            send(&app, post_json("/api/files/read", json!({"path": "pkg/new.rs"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "fn created() {}\n");
    }

    #[tokio::test]
    async fn test_read_and_overwrite_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn before() {}\n").unwrap();
        let state = test_state(dir.path());
        let store = state.store.clone();
        let app = create_app(state);

        let (status, body) = send(&app, post_json("/api/files/read", json!({"path": "a.rs"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "fn before() {}\n");
        assert!(!body["path"].as_str().unwrap().ends_with('/'));

        let (status, body) = send(
            &app,
            post_json("/api/files/write", json!({"path": "a.rs", "content": "fn after() {}\n"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "written");
        let file_path = body["path"].as_str().unwrap().to_string();
        assert_eq!(store.get(&Indexer::chunk_id(&file_path, 0)).unwrap().text, "fn after() {}\n");

        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.rs")).unwrap(),
            "fn after() {}\n"
        );
    }

    #[tokio::test]
    async fn test_write_outside_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("root")).unwrap();
        let app = create_app(test_state(&dir.path().join("root")));

        let (status, _) = send(
            &app,
            post_json("/api/files/write", json!({"path": "../escape.rs", "content": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!dir.path().join("escape.rs").exists());
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(dir.path()));
        let (status, body) =
            send(&app, post_json("/api/files/read", json!({"path": "nope.rs"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
    }
}
