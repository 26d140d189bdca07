use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Embedding dimension mismatch: store holds {expected}-d vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid chunking parameters: max_lines={max_lines}, overlap={overlap} (need max_lines >= 1 and overlap < max_lines)")]
    InvalidChunking { max_lines: usize, overlap: usize },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Corrupt record at line {line}: {reason}")]
    PersistenceCorruption { line: usize, reason: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Path not allowed: {0}")]
    PathNotAllowed(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::DimensionMismatch { .. } => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::InvalidChunking { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Embedding(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::PersistenceCorruption { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::FileNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::DocumentNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::PathNotAllowed(_) => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Serde(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
