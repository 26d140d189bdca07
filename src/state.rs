use crate::config::AppConfig;
use crate::embedder::Embedder;
use crate::error::{AppError, AppResult};
use crate::indexer::{IndexOptions, Indexer};
use crate::store::{JsonlVectorStore, VectorStore};
use crate::watcher::WatcherStats;
use std::path::{Component, PathBuf};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Canonical project root; every path the HTTP surface touches lies inside it.
    pub root: PathBuf,
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub indexer: Arc<Indexer>,
    pub watcher_stats: Arc<WatcherStats>,
}

impl AppState {
    /// Open the persisted store under `config.data_dir` and wire the indexer.
    pub fn new(config: AppConfig, embedder: Arc<dyn Embedder>) -> AppResult<Self> {
        let store: Arc<dyn VectorStore> = Arc::new(JsonlVectorStore::open(&config.data_dir)?);
        Self::with_store(config, store, embedder)
    }

    pub fn with_store(
        config: AppConfig,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> AppResult<Self> {
        let root = dunce::canonicalize(&config.root)
            .map_err(|_| AppError::FileNotFound(config.root.to_string_lossy().to_string()))?;
        let indexer = Arc::new(Indexer::new(
            store.clone(),
            embedder.clone(),
            IndexOptions::from_config(&config),
        )?);

        Ok(Self {
            config: Arc::new(config),
            root,
            store,
            embedder,
            indexer,
            watcher_stats: Arc::new(WatcherStats::default()),
        })
    }

    /// Resolve `path` (relative to the root, or absolute) to a canonical path
    /// inside the root. The target itself does not have to exist yet, but
    /// `..` is only accepted in the part of the path that does.
    pub fn resolve_path(&self, path: &str) -> AppResult<PathBuf> {
        let full_path = self.root.join(path);

        // Canonicalize the deepest existing ancestor, re-append the rest.
        let mut existing = full_path.as_path();
        let mut rest: Vec<&std::ffi::OsStr> = Vec::new();
        let canonical = loop {
            match dunce::canonicalize(existing) {
                Ok(c) => break c,
                Err(_) => {
                    let Some(parent) = existing.parent() else {
                        return Err(AppError::FileNotFound(path.to_string()));
                    };
                    // `file_name` is None only for a trailing `..`.
                    let Some(name) = existing.file_name() else {
                        return Err(AppError::PathNotAllowed(format!(
                            "Path '{}' is outside the project root",
                            path
                        )));
                    };
                    rest.push(name);
                    existing = parent;
                }
            }
        };

        let rest: PathBuf = rest.into_iter().rev().collect();
        if rest
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(AppError::PathNotAllowed(format!(
                "Path '{}' is outside the project root",
                path
            )));
        }

        // Joining an empty path would append a trailing separator.
        let resolved = if rest.as_os_str().is_empty() {
            canonical
        } else {
            canonical.join(rest)
        };
        if !resolved.starts_with(&self.root) {
            return Err(AppError::PathNotAllowed(format!(
                "Path '{}' is outside the project root",
                path
            )));
        }
        Ok(resolved)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::embedder::HashEmbedder;
    use crate::store::InMemoryVectorStore;
    use std::path::Path;

    pub(crate) fn test_config(root: &Path, data_dir: &Path) -> AppConfig {
        let mut config = AppConfig::from_lookup(|_| None);
        config.root = root.to_path_buf();
        config.data_dir = data_dir.to_string_lossy().to_string();
        config.chunk_lines = 20;
        config.chunk_overlap = 2;
        config
    }

    pub(crate) fn test_state(root: &Path) -> AppState {
        AppState::with_store(
            test_config(root, &root.join(".data")),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(HashEmbedder::new(16)),
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_path_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        let state = test_state(dir.path());

        let lossy = |p: &str| state.resolve_path(p).unwrap().to_string_lossy().to_string();
        let lib = state.root.join("src/lib.rs").to_string_lossy().to_string();

        assert_eq!(lossy("src/lib.rs"), lib);
        assert!(state.resolve_path("src/lib.rs").unwrap().is_file());
        assert_eq!(
            lossy("src/new/mod.rs"),
            state.root.join("src/new/mod.rs").to_string_lossy()
        );
        assert_eq!(lossy("src/../src/lib.rs"), lib);
        assert_eq!(lossy(&lib), lib);
        assert_eq!(lossy("src"), state.root.join("src").to_string_lossy());
    }

    #[test]
    fn test_resolve_path_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("root")).unwrap();
        let state = test_state(&dir.path().join("root"));

        assert!(matches!(state.resolve_path("../outside.rs"), Err(AppError::PathNotAllowed(_))));
        assert!(matches!(state.resolve_path("missing/../../x.rs"), Err(AppError::PathNotAllowed(_))));
        assert!(matches!(state.resolve_path("/etc/passwd"), Err(AppError::PathNotAllowed(_))));
    }

    #[test]
    fn test_missing_root_is_rejected() {
        let result = AppState::with_store(
            test_config(Path::new("/no/such/root"), Path::new("/tmp")),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(HashEmbedder::default()),
        );
        assert!(matches!(result, Err(AppError::FileNotFound(_))));
    }
}
