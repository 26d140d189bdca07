use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::blocking;
use crate::error::{AppError, AppResult};
use crate::indexer::{Indexer, TreeIndexReport};
use crate::state::AppState;
use crate::watcher::WatcherStatus;

#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    /// Subtree to sync; the whole project root when omitted.
    #[serde(default)]
    pub root: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReembedRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct IndexStatus {
    pub root: String,
    pub records: usize,
    pub dimension: Option<usize>,
    pub model: String,
    pub model_ready: bool,
    pub watcher: WatcherStatus,
}

pub async fn sync_index(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> AppResult<Json<TreeIndexReport>> {
    let root = match req.root.as_deref() {
        Some(path) => state.resolve_path(path)?,
        None => state.root.clone(),
    };
    if !root.is_dir() {
        return Err(AppError::FileNotFound(root.to_string_lossy().to_string()));
    }

    info!("Sync requested for {}", root.display());
    let indexer = state.indexer.clone();
    let report = blocking(move || indexer.reindex_tree(&root)).await?;
    Ok(Json(report))
}

pub async fn index_status(State(state): State<AppState>) -> Json<IndexStatus> {
    Json(IndexStatus {
        root: state.root.to_string_lossy().to_string(),
        records: state.store.len(),
        dimension: state.store.dimension(),
        model: state.embedder.model_name().to_string(),
        model_ready: state.embedder.is_ready(),
        watcher: state.watcher_stats.status(),
    })
}

pub async fn reembed(
    State(state): State<AppState>,
    Json(req): Json<ReembedRequest>,
) -> AppResult<Json<TreeIndexReport>> {
    if req.ids.is_empty() {
        return Err(AppError::BadRequest("ids must not be empty".into()));
    }
    // Resolve through the filesystem so a symlink inside the root cannot
    // pull in a file that lies outside it.
    for path in req.ids.iter().filter_map(|id| Indexer::file_path_of(id)) {
        if !Path::new(path).is_absolute() {
            return Err(AppError::PathNotAllowed(format!(
                "Path '{}' is outside the project root",
                path
            )));
        }
        let resolved = state.resolve_path(path)?;
        if resolved != Path::new(path) {
            return Err(AppError::PathNotAllowed(format!(
                "Path '{}' does not resolve to itself inside the project root",
                path
            )));
        }
    }

    let indexer = state.indexer.clone();
    let report = blocking(move || Ok(indexer.reembed_ids(&req.ids))).await?;
    Ok(Json(report))
}
