//! Polling watcher: fingerprints the tree every interval and re-embeds the
//! files whose content changed since the previous poll.
//!
//! The snapshot (`path -> fingerprint`) is owned by the watcher task. Each
//! tick moves it onto the blocking pool and gets it back with the result, so
//! nothing but the store is ever shared with request handlers.

use crate::error::AppResult;
use crate::fingerprint::fingerprint_file;
use crate::indexer::Indexer;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type Snapshot = HashMap<PathBuf, String>;

/// Outcome of one poll.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Paths whose fingerprint was new or different, in sorted order.
    pub changed: Vec<PathBuf>,
    pub reindexed: usize,
    pub failures: usize,
    pub pruned: usize,
}

/// Fingerprint every eligible file under `root`. Files that cannot be read
/// are left out, so they count as new once they become readable.
pub fn snapshot_tree(indexer: &Indexer, root: &Path) -> Snapshot {
    indexer
        .collect_files(root)
        .into_par_iter()
        .filter_map(|path| match fingerprint_file(&path) {
            Ok(fp) => Some((path, fp)),
            Err(e) => {
                debug!("Cannot fingerprint {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

/// Run one watcher tick against `previous` and replace it with the new
/// snapshot, whatever happened to the individual files.
///
/// A file that failed to re-embed keeps its new fingerprint in the snapshot
/// and is retried on its next change, not on every tick.
pub fn poll_once(
    indexer: &Indexer,
    root: &Path,
    previous: &mut Snapshot,
    prune_deleted: bool,
) -> TickReport {
    let current = snapshot_tree(indexer, root);
    let mut report = TickReport::default();

    let mut changed: Vec<&PathBuf> = current
        .iter()
        .filter(|(path, fp)| previous.get(*path) != Some(*fp))
        .map(|(path, _)| path)
        .collect();
    changed.sort();

    for path in changed {
        match indexer.reindex_file(path) {
            Ok(file) => {
                report.reindexed += 1;
                debug!(path = %path.display(), chunks = file.chunks, "Watcher re-embedded file");
            }
            Err(e) => {
                report.failures += 1;
                warn!("Watcher failed to re-embed {}: {}", path.display(), e);
            }
        }
        report.changed.push(path.clone());
    }

    if prune_deleted {
        for path in previous.keys() {
            if current.contains_key(path) || path.exists() {
                continue;
            }
            match indexer.store().delete_file(&path.to_string_lossy()) {
                Ok(removed) => {
                    report.pruned += removed;
                    debug!(path = %path.display(), removed, "Pruned records of deleted file");
                }
                Err(e) => {
                    report.failures += 1;
                    warn!("Failed to prune {}: {}", path.display(), e);
                }
            }
        }
    }

    *previous = current;
    report
}

/// Counters shared between the watcher task and status readers.
#[derive(Debug, Default)]
pub struct WatcherStats {
    ticks: AtomicU64,
    files_reindexed: AtomicU64,
    failures: AtomicU64,
    pruned: AtomicU64,
    last_tick: Mutex<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatcherStatus {
    pub ticks: u64,
    pub files_reindexed: u64,
    pub failures: u64,
    pub pruned: u64,
    pub last_tick: Option<DateTime<Utc>>,
}

impl WatcherStats {
    fn record(&self, report: &TickReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.files_reindexed
            .fetch_add(report.reindexed as u64, Ordering::Relaxed);
        self.failures
            .fetch_add(report.failures as u64, Ordering::Relaxed);
        self.pruned.fetch_add(report.pruned as u64, Ordering::Relaxed);
        *self.last_tick.lock() = Some(Utc::now());
    }

    pub fn status(&self) -> WatcherStatus {
        WatcherStatus {
            ticks: self.ticks.load(Ordering::Relaxed),
            files_reindexed: self.files_reindexed.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
            last_tick: *self.last_tick.lock(),
        }
    }
}

pub struct WatcherHandle {
    stats: Arc<WatcherStats>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn stats(&self) -> Arc<WatcherStats> {
        self.stats.clone()
    }

    /// Ask the loop to stop and wait for it. A tick in progress finishes
    /// first.
    pub async fn stop(self) {
        let _ = self.cancel.send(true);
        if let Err(e) = self.task.await {
            warn!("Watcher task ended abnormally: {}", e);
        }
    }
}

/// Start polling `root` every `interval` on the current tokio runtime,
/// recording progress into `stats`.
pub fn start(
    indexer: Arc<Indexer>,
    root: &Path,
    interval: Duration,
    prune_deleted: bool,
    stats: Arc<WatcherStats>,
) -> AppResult<WatcherHandle> {
    let root = dunce::canonicalize(root)?;
    let (cancel, cancelled) = watch::channel(false);

    info!(
        "Started watching {} (interval: {}ms, prune deleted: {})",
        root.display(),
        interval.as_millis(),
        prune_deleted
    );

    let task = tokio::spawn(run(
        indexer,
        root,
        interval,
        prune_deleted,
        stats.clone(),
        cancelled,
    ));

    Ok(WatcherHandle {
        stats,
        cancel,
        task,
    })
}

async fn baseline(indexer: &Arc<Indexer>, root: &Path) -> Snapshot {
    let indexer = indexer.clone();
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || snapshot_tree(&indexer, &root))
        .await
        .unwrap_or_else(|e| {
            warn!("Watcher snapshot failed: {}", e);
            Snapshot::new()
        })
}

async fn run(
    indexer: Arc<Indexer>,
    root: PathBuf,
    interval: Duration,
    prune_deleted: bool,
    stats: Arc<WatcherStats>,
    mut cancelled: watch::Receiver<bool>,
) {
    let mut snapshot = baseline(&indexer, &root).await;
    debug!("Watcher baseline holds {} files", snapshot.len());

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancelled.changed() => break,
        }

        let tick_indexer = indexer.clone();
        let tick_root = root.clone();
        let result = tokio::task::spawn_blocking(move || {
            let report = poll_once(&tick_indexer, &tick_root, &mut snapshot, prune_deleted);
            (snapshot, report)
        })
        .await;

        match result {
            Ok((next, report)) => {
                snapshot = next;
                stats.record(&report);
                if report.reindexed > 0 || report.failures > 0 || report.pruned > 0 {
                    info!(
                        "Watcher tick: {} re-embedded, {} failed, {} records pruned",
                        report.reindexed, report.failures, report.pruned
                    );
                }
            }
            Err(e) => {
                warn!("Watcher tick panicked, re-baselining: {}", e);
                snapshot = baseline(&indexer, &root).await;
            }
        }
    }

    info!("Stopped watching {}", root.display());
}
