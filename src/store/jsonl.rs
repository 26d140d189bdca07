//! Persisted store: one JSON record per line in `<dir>/vectors.jsonl`.
//!
//! All records live in memory behind a single `RwLock`. Every mutation
//! rewrites the complete record set to a temp file, fsyncs it and renames it
//! over the previous file, so the file on disk always holds either the old
//! or the new state. The write lock is held across the flush: mutations are
//! totally ordered and queries never see a half-applied one.

use parking_lot::RwLock;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{DocumentMatch, Metadata, Record, RecordSet, VectorStore};
use crate::error::{AppError, AppResult};

pub const STORE_FILE: &str = "vectors.jsonl";

pub struct JsonlVectorStore {
    path: PathBuf,
    tmp_path: PathBuf,
    state: RwLock<RecordSet>,
}

impl JsonlVectorStore {
    /// Open (or create) the store under `dir`, loading every persisted record
    /// before returning. Failing to create `dir` or read an existing file is
    /// fatal; individual unparseable lines are skipped and logged.
    pub fn open(dir: impl AsRef<Path>) -> AppResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let path = dir.join(STORE_FILE);
        let tmp_path = dir.join(format!("{}.tmp", STORE_FILE));
        let state = Self::load(&path)?;

        info!(
            path = %path.display(),
            records = state.len(),
            dimension = ?state.dimension(),
            "Vector store loaded"
        );

        Ok(Self {
            path,
            tmp_path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> AppResult<RecordSet> {
        let mut set = RecordSet::default();
        if !path.exists() {
            return Ok(set);
        }

        let bytes = std::fs::read(path)?;
        let mut skipped = 0usize;
        for (i, raw) in bytes.split(|b| *b == b'\n').enumerate() {
            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let parsed = serde_json::from_slice::<Record>(raw)
                .map_err(|e| e.to_string())
                .and_then(|record| set.upsert(record).map_err(|e| e.to_string()));
            if let Err(reason) = parsed {
                skipped += 1;
                let err = AppError::PersistenceCorruption { line: i + 1, reason };
                warn!(path = %path.display(), "Skipping record: {}", err);
            }
        }

        if skipped > 0 {
            warn!(
                path = %path.display(),
                skipped,
                "Vector store loaded with corrupt lines; affected chunks are re-embedded on their next change"
            );
        }
        Ok(set)
    }

    /// Write the whole set to the temp file, fsync, then rename into place.
    fn persist(&self, set: &RecordSet) -> AppResult<()> {
        let file = File::create(&self.tmp_path)?;
        let mut writer = BufWriter::new(file);
        for record in set.iter() {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        std::fs::rename(&self.tmp_path, &self.path)?;
        // The new state is in place; a failed directory sync only weakens
        // durability and must not desync memory from disk.
        if let Err(e) = sync_dir(&self.path) {
            warn!(path = %self.path.display(), "Failed to sync store directory: {}", e);
        }

        debug!(path = %self.path.display(), records = set.len(), "Vector store flushed");
        Ok(())
    }

    /// Apply `op` to a copy of the current state, persist the copy, then
    /// publish it. Any error leaves memory and disk at the previous state.
    fn mutate<T>(&self, op: impl FnOnce(&mut RecordSet) -> AppResult<T>) -> AppResult<T> {
        let mut guard = self.state.write();
        let mut next = guard.clone();
        let out = op(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }
}

/// Make the rename itself durable by syncing the containing directory.
#[cfg(unix)]
fn sync_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) => File::open(dir)?.sync_all(),
        None => Ok(()),
    }
}

/// Directories cannot be opened for syncing here; the rename is atomic but
/// may not survive a power loss.
#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

impl VectorStore for JsonlVectorStore {
    fn upsert(&self, record: Record) -> AppResult<()> {
        self.mutate(|set| set.upsert(record))
    }

    fn replace_file(&self, file_path: &str, records: Vec<Record>) -> AppResult<usize> {
        self.mutate(|set| set.replace_file(file_path, records))
    }

    fn add_documents(
        &self,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<Metadata>,
    ) -> AppResult<Vec<String>> {
        self.mutate(|set| set.add_documents(texts, embeddings, metadatas))
    }

    fn get(&self, id: &str) -> Option<Record> {
        self.state.read().get(id).cloned()
    }

    fn delete(&self, id: &str) -> AppResult<bool> {
        if self.state.read().get(id).is_none() {
            return Ok(false);
        }
        self.mutate(|set| Ok(set.remove(id).is_some()))
    }

    fn delete_file(&self, file_path: &str) -> AppResult<usize> {
        self.mutate(|set| Ok(set.remove_file(file_path)))
    }

    fn similarity_search(&self, query: &[f32], k: usize) -> AppResult<Vec<DocumentMatch>> {
        self.state.read().search(query, k)
    }

    fn len(&self) -> usize {
        self.state.read().len()
    }

    fn dimension(&self) -> Option<usize> {
        self.state.read().dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{file_record, record};
    use crate::store::{META_END_LINE, META_FILE_FINGERPRINT, META_START_LINE};
    use std::sync::Arc;

    #[test]
    fn test_round_trip_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let mut written = Vec::new();
        {
            let store = JsonlVectorStore::open(dir.path()).unwrap();
            for i in 0..5 {
                let mut r = file_record("/src/lib.rs", i, vec![i as f32 + 0.5, -1.25, 3.0e-7]);
                r.text = format!("line {}\nwith \"quotes\" and unicode ✓\n", i);
                r.metadata.insert(META_START_LINE.into(), (i * 10 + 1).to_string());
                r.metadata.insert(META_END_LINE.into(), (i * 10 + 10).to_string());
                r.metadata.insert(META_FILE_FINGERPRINT.into(), "abc".into());
                store.upsert(r.clone()).unwrap();
                written.push(r);
            }
        }

        let reopened = JsonlVectorStore::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 5);
        assert_eq!(reopened.dimension(), Some(3));
        for r in &written {
            assert_eq!(reopened.get(&r.id).as_ref(), Some(r));
        }
        assert!(!dir.path().join("vectors.jsonl.tmp").exists());
    }

    #[test]
    fn test_file_is_line_delimited() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlVectorStore::open(dir.path()).unwrap();
        store.upsert(record("a", "one\ntwo\n", vec![1.0, 0.0])).unwrap();
        store.upsert(record("b", "three", vec![0.0, 1.0])).unwrap();
        store.upsert(record("a", "replaced", vec![1.0, 0.0])).unwrap();

        let contents = std::fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Record = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.id, "a");
        assert_eq!(first.text, "replaced");
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = serde_json::to_string(&record("good", "ok", vec![1.0, 2.0])).unwrap();
        let wrong_dim = serde_json::to_string(&record("bad-dim", "x", vec![1.0])).unwrap();
        let later = serde_json::to_string(&record("later", "ok", vec![2.0, 1.0])).unwrap();
        std::fs::write(
            dir.path().join(STORE_FILE),
            format!("{}\n{{\"id\": \"trunc\n\n{}\nnot json\n{}", good, wrong_dim, later),
        )
        .unwrap();

        let store = JsonlVectorStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get("good").is_some());
        assert!(store.get("later").is_some());
        assert!(store.get("bad-dim").is_none());
    }

    #[test]
    fn test_rejected_upsert_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlVectorStore::open(dir.path()).unwrap();
        store.upsert(record("a", "x", vec![1.0, 0.0])).unwrap();
        let before = std::fs::read(store.path()).unwrap();

        assert!(matches!(
            store.upsert(record("b", "y", vec![1.0])),
            Err(AppError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_failed_flush_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlVectorStore::open(dir.path()).unwrap();
        store.upsert(record("a", "x", vec![1.0, 0.0])).unwrap();
        let before = std::fs::read(store.path()).unwrap();

        // A directory in the temp file's place makes the flush fail.
        std::fs::create_dir(dir.path().join("vectors.jsonl.tmp")).unwrap();
        assert!(matches!(
            store.upsert(record("b", "y", vec![0.0, 1.0])),
            Err(AppError::Io(_))
        ));
        assert_eq!(store.len(), 1);
        assert!(store.get("b").is_none());
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_emptied_store_accepts_new_dimension_live_and_reopened() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonlVectorStore::open(dir.path()).unwrap();
            store.upsert(record("a", "x", vec![1.0, 0.0])).unwrap();
            assert!(store.delete("a").unwrap());
            assert_eq!(store.dimension(), None);
            store.upsert(record("b", "y", vec![1.0, 0.0, 0.0])).unwrap();
            assert!(store.delete("b").unwrap());
        }
        let store = JsonlVectorStore::open(dir.path()).unwrap();
        assert_eq!(store.dimension(), None);
        store.upsert(record("c", "z", vec![1.0, 0.0, 0.0, 0.0])).unwrap();
        assert_eq!(store.dimension(), Some(4));
    }

    #[test]
    fn test_delete_and_delete_file_persist() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonlVectorStore::open(dir.path()).unwrap();
            store.upsert(file_record("/a.rs", 0, vec![1.0])).unwrap();
            store.upsert(file_record("/a.rs", 1, vec![1.0])).unwrap();
            store.upsert(record("x", "adhoc", vec![1.0])).unwrap();
            store.upsert(record("y", "adhoc", vec![1.0])).unwrap();
            assert!(store.delete("x").unwrap());
            assert!(!store.delete("x").unwrap());
            assert_eq!(store.delete_file("/a.rs").unwrap(), 2);
        }
        let store = JsonlVectorStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("y").is_some());
    }

    #[test]
    fn test_add_documents_generates_unique_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlVectorStore::open(dir.path()).unwrap();
        let ids = store
            .add_documents(
                vec!["a".into(), "b".into()],
                vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                vec![Metadata::new(), Metadata::new()],
            )
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(store.get(&ids[1]).unwrap().text, "b");
    }

    #[test]
    fn test_two_vector_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlVectorStore::open(dir.path()).unwrap();
        store.upsert(record("first", "x", vec![1.0, 0.0])).unwrap();
        store.upsert(record("second", "y", vec![0.0, 1.0])).unwrap();
        let hits = store.similarity_search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "first");
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonlVectorStore::open(dir.path()).unwrap());
        let mut handles = Vec::new();
        for t in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..10 {
                    store
                        .upsert(record(&format!("{}-{}", t, i), "x", vec![t as f32 + 1.0, i as f32]))
                        .unwrap();
                    let hits = store.similarity_search(&[1.0, 0.0], 3).unwrap();
                    assert!(hits.len() <= 3);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 40);
        assert_eq!(JsonlVectorStore::open(dir.path()).unwrap().len(), 40);
    }

    #[test]
    fn test_open_fails_when_dir_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        assert!(JsonlVectorStore::open(blocker.join("sub")).is_err());
    }
}
