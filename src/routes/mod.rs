pub mod documents;
pub mod files;
pub mod health;
pub mod index;
pub mod search;

use crate::error::{AppError, AppResult};

/// Run embedding, file IO or a store flush on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("blocking task failed: {}", e)))?
}
