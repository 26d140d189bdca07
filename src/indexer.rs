use crate::chunker::{chunk_lines, validate_params};
use crate::config::{is_supported_extension, AppConfig, SUPPORTED_FILE_NAMES};
use crate::embedder::Embedder;
use crate::error::{AppError, AppResult};
use crate::fingerprint::fingerprint;
use crate::store::{
    Metadata, Record, VectorStore, META_END_LINE, META_FILE_FINGERPRINT, META_FILE_PATH,
    META_START_LINE,
};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub max_lines: usize,
    pub overlap: usize,
    pub max_file_size: usize,
    pub exclude_patterns: Vec<String>,
}

impl IndexOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_lines: config.chunk_lines,
            overlap: config.chunk_overlap,
            max_file_size: config.max_file_size_bytes,
            exclude_patterns: config.exclude_patterns.clone(),
        }
    }
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            max_lines: crate::config::DEFAULT_CHUNK_LINES,
            overlap: crate::config::DEFAULT_CHUNK_OVERLAP,
            max_file_size: 10 * 1024 * 1024,
            exclude_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileIndexReport {
    pub file_path: String,
    pub fingerprint: String,
    pub chunks: usize,
    /// Chunks from a previous, longer version of the file that were dropped.
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TreeIndexReport {
    pub files_indexed: usize,
    pub chunks: usize,
    pub failures: Vec<FileFailure>,
    pub duration_ms: u64,
}

impl TreeIndexReport {
    fn record(&mut self, path: &Path, result: AppResult<FileIndexReport>) {
        match result {
            Ok(report) => {
                self.files_indexed += 1;
                self.chunks += report.chunks;
            }
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                self.failures.push(FileFailure {
                    path: path.to_string_lossy().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Chunks files, embeds each chunk and writes the records to the store.
///
/// Embedding happens before the store is touched, so the store lock is only
/// held for the final `replace_file` of each file.
pub struct Indexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    max_lines: usize,
    overlap: usize,
    max_file_size: usize,
    exclude: GlobSet,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        options: IndexOptions,
    ) -> AppResult<Self> {
        validate_params(options.max_lines, options.overlap)?;

        let mut builder = GlobSetBuilder::new();
        for pattern in &options.exclude_patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                AppError::BadRequest(format!("Invalid exclude pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let exclude = builder
            .build()
            .map_err(|e| AppError::BadRequest(format!("Invalid exclude patterns: {}", e)))?;

        Ok(Self {
            store,
            embedder,
            max_lines: options.max_lines,
            overlap: options.overlap,
            max_file_size: options.max_file_size,
            exclude,
        })
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Record id for chunk `index` of `file_path`. Path and position only,
    /// never content, so re-embedding a chunk replaces it.
    pub fn chunk_id(file_path: &str, index: usize) -> String {
        format!("{}:{}", file_path, index)
    }

    /// Owning file path of a chunk id produced by [`Indexer::chunk_id`].
    pub fn file_path_of(id: &str) -> Option<&str> {
        id.rsplit_once(':')
            .filter(|(_, idx)| idx.parse::<usize>().is_ok())
            .map(|(path, _)| path)
    }

    /// Re-embed every chunk of one file.
    ///
    /// All chunks are written in a single store mutation, so every record of
    /// the file carries the same `file_fingerprint` and chunks left over from
    /// a longer previous version are removed.
    pub fn reindex_file(&self, path: &Path) -> AppResult<FileIndexReport> {
        let canonical = dunce::canonicalize(path)?;
        let bytes = std::fs::read(&canonical)?;
        let file_fingerprint = fingerprint(&bytes);
        let content = String::from_utf8(bytes).map_err(|_| {
            AppError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} is not valid UTF-8", canonical.display()),
            ))
        })?;

        let file_path = canonical.to_string_lossy().to_string();
        let chunks = chunk_lines(&content, self.max_lines, self.overlap)?;
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_many(&texts)?;
        if embeddings.len() != chunks.len() {
            return Err(AppError::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let records: Vec<Record> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let mut metadata = Metadata::new();
                metadata.insert(META_FILE_PATH.to_string(), file_path.clone());
                metadata.insert(META_START_LINE.to_string(), chunk.start_line.to_string());
                metadata.insert(META_END_LINE.to_string(), chunk.end_line.to_string());
                metadata.insert(META_FILE_FINGERPRINT.to_string(), file_fingerprint.clone());
                Record {
                    id: Self::chunk_id(&file_path, chunk.index),
                    text: chunk.text,
                    embedding,
                    metadata,
                }
            })
            .collect();

        let chunk_count = records.len();
        let removed = self.store.replace_file(&file_path, records)?;

        debug!(
            path = %file_path,
            chunks = chunk_count,
            removed,
            "Re-embedded file"
        );

        Ok(FileIndexReport {
            file_path,
            fingerprint: file_fingerprint,
            chunks: chunk_count,
            removed,
        })
    }

    /// Re-embed every eligible file under `root`. A file that fails is
    /// reported and skipped; only an unusable `root` fails the whole call.
    pub fn reindex_tree(&self, root: &Path) -> AppResult<TreeIndexReport> {
        let start = std::time::Instant::now();
        let root = dunce::canonicalize(root)
            .map_err(|_| AppError::FileNotFound(root.to_string_lossy().to_string()))?;

        let files = self.collect_files(&root);
        info!("Indexing {} eligible files under {}", files.len(), root.display());

        let mut report = TreeIndexReport::default();
        for file in &files {
            report.record(file, self.reindex_file(file));
        }
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Indexing complete for {}: {} files, {} chunks, {} failed, in {}ms",
            root.display(),
            report.files_indexed,
            report.chunks,
            report.failures.len(),
            report.duration_ms
        );
        Ok(report)
    }

    /// Refresh records by id, by re-embedding each owning file once.
    pub fn reembed_ids(&self, ids: &[String]) -> TreeIndexReport {
        let start = std::time::Instant::now();
        let mut seen = HashSet::new();
        let mut report = TreeIndexReport::default();

        for id in ids {
            let Some(path) = Self::file_path_of(id) else {
                report.failures.push(FileFailure {
                    path: id.clone(),
                    error: format!("'{}' is not a file chunk id", id),
                });
                continue;
            };
            if seen.insert(path.to_string()) {
                let path = Path::new(path);
                report.record(path, self.reindex_file(path));
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    /// Eligible files under `root`, sorted. Honors .gitignore, skips build
    /// output directories, unsupported extensions, excluded globs and files
    /// over the size limit.
    pub fn collect_files(&self, root: &Path) -> Vec<PathBuf> {
        let max_file_size = self.max_file_size as u64;
        let mut files: Vec<PathBuf> = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .max_depth(Some(20))
            .build()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter(|entry| {
                entry
                    .metadata()
                    .map(|m| m.len() <= max_file_size)
                    .unwrap_or(false)
            })
            .filter(|entry| self.is_eligible(root, entry.path()))
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }

    /// Path-only eligibility check (no size limit, no .gitignore).
    pub fn is_eligible(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        !Self::is_build_or_output_dir(relative)
            && !self.exclude.is_match(relative)
            && Self::is_indexable(path)
    }

    fn is_indexable(path: &Path) -> bool {
        let ext = path
            .extension()
            .unwrap_or_default()
            .to_string_lossy()
            .to_lowercase();

        is_supported_extension(&ext)
            || path.file_name().is_some_and(|n| {
                let name = n.to_string_lossy().to_lowercase();
                SUPPORTED_FILE_NAMES.contains(&name.as_str())
            })
    }

    /// True when any component of `path` is a build/output or tooling
    /// directory that should never be indexed, even without a .gitignore.
    pub fn is_build_or_output_dir(path: &Path) -> bool {
        path.components().any(|component| {
            let std::path::Component::Normal(name) = component else {
                return false;
            };
            let name = name.to_string_lossy();
            matches!(
                name.as_ref(),
                "node_modules"
                    | ".git"
                    | "target"
                    | "dist"
                    | "build"
                    | "out"
                    | ".next"
                    | ".venv"
                    | "venv"
                    | "__pycache__"
                    | ".tox"
                    | ".mypy_cache"
                    | ".pytest_cache"
                    | ".ruff_cache"
                    | "coverage"
                    | ".cache"
                    | "vendor"
                    | ".gradle"
                    | ".idea"
                    | ".vscode"
            ) || name.ends_with(".egg-info")
        })
    }
}
