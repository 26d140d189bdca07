//! Vector store: (id, text, embedding, metadata) records with exact
//! k-nearest-neighbour search by cosine distance.
//!
//! [`VectorStore`] is the seam shared by the watcher (writer) and the search
//! facade (reader). [`JsonlVectorStore`] is the persisted implementation;
//! [`InMemoryVectorStore`] is a non-persisted double for tests.
//!
//! Search is a linear scan, O(n·D) per query. That is the scalability
//! ceiling of this store, traded for exact ranking.

mod jsonl;
mod memory;

pub use jsonl::{JsonlVectorStore, STORE_FILE};
pub use memory::InMemoryVectorStore;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const META_FILE_PATH: &str = "file_path";
pub const META_START_LINE: &str = "start_line";
pub const META_END_LINE: &str = "end_line";
pub const META_FILE_FINGERPRINT: &str = "file_fingerprint";

pub type Metadata = BTreeMap<String, String>;

/// One stored chunk. Also the on-disk line format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Record {
    pub fn file_path(&self) -> Option<&str> {
        self.metadata.get(META_FILE_PATH).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentMatch {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Cosine distance in [0, 2]; 0 means identical direction.
    pub distance: f32,
}

pub trait VectorStore: Send + Sync {
    /// Insert or replace the record with `record.id`.
    fn upsert(&self, record: Record) -> AppResult<()>;

    /// Upsert every chunk of `file_path` and drop that file's chunks that are
    /// not in `records`, as one mutation. Returns how many were dropped.
    fn replace_file(&self, file_path: &str, records: Vec<Record>) -> AppResult<usize>;

    /// Bulk insert with store-generated ids.
    fn add_documents(
        &self,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<Metadata>,
    ) -> AppResult<Vec<String>>;

    fn get(&self, id: &str) -> Option<Record>;

    fn delete(&self, id: &str) -> AppResult<bool>;

    /// Remove every chunk whose `file_path` metadata equals `file_path`.
    fn delete_file(&self, file_path: &str) -> AppResult<usize>;

    /// Up to `k` matches in ascending distance; ties keep insertion order.
    fn similarity_search(&self, query: &[f32], k: usize) -> AppResult<Vec<DocumentMatch>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The established embedding length, once any record has been stored.
    fn dimension(&self) -> Option<usize>;
}

/// `1 - a·b / (|a| |b|)`, or `1.0` when either norm is zero.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 2.0) as f32
}

/// In-memory record collection shared by both store implementations.
///
/// Records iterate in insertion order; replacing an id keeps its slot.
/// Every mutating method validates its whole input before touching state,
/// so a returned error always means nothing changed.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordSet {
    records: BTreeMap<u64, Record>,
    slots: HashMap<String, u64>,
    next_slot: u64,
    dimension: Option<usize>,
}

impl RecordSet {
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Record> {
        self.slots.get(id).and_then(|slot| self.records.get(slot))
    }

    /// Check a batch of embeddings against D (or against each other when D
    /// is not yet established) and return the resulting D.
    fn check_dimensions<'a, I>(&self, embeddings: I) -> AppResult<Option<usize>>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let mut dimension = self.dimension;
        for embedding in embeddings {
            if embedding.is_empty() {
                return Err(AppError::BadRequest("embedding must not be empty".into()));
            }
            match dimension {
                Some(expected) if expected != embedding.len() => {
                    return Err(AppError::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
                Some(_) => {}
                None => dimension = Some(embedding.len()),
            }
        }
        Ok(dimension)
    }

    fn put(&mut self, record: Record) {
        match self.slots.get(&record.id) {
            Some(slot) => {
                self.records.insert(*slot, record);
            }
            None => {
                let slot = self.next_slot;
                self.next_slot += 1;
                self.slots.insert(record.id.clone(), slot);
                self.records.insert(slot, record);
            }
        }
    }

    pub(crate) fn upsert(&mut self, record: Record) -> AppResult<()> {
        self.dimension = self.check_dimensions([record.embedding.as_slice()])?;
        self.put(record);
        Ok(())
    }

    pub(crate) fn replace_file(&mut self, file_path: &str, records: Vec<Record>) -> AppResult<usize> {
        let dimension = self.check_dimensions(records.iter().map(|r| r.embedding.as_slice()))?;

        let keep: std::collections::HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let stale: Vec<String> = self
            .iter()
            .filter(|r| r.file_path() == Some(file_path) && !keep.contains(r.id.as_str()))
            .map(|r| r.id.clone())
            .collect();

        for id in &stale {
            self.remove(id);
        }
        for record in records {
            self.put(record);
        }
        if !self.records.is_empty() {
            self.dimension = dimension;
        }
        Ok(stale.len())
    }

    pub(crate) fn add_documents(
        &mut self,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<Metadata>,
    ) -> AppResult<Vec<String>> {
        if texts.len() != embeddings.len() || texts.len() != metadatas.len() {
            return Err(AppError::BadRequest(format!(
                "texts ({}), embeddings ({}) and metadatas ({}) must have the same length",
                texts.len(),
                embeddings.len(),
                metadatas.len()
            )));
        }
        self.dimension = self.check_dimensions(embeddings.iter().map(Vec::as_slice))?;

        let mut ids = Vec::with_capacity(texts.len());
        for ((text, embedding), metadata) in texts.into_iter().zip(embeddings).zip(metadatas) {
            let id = Uuid::new_v4().simple().to_string();
            ids.push(id.clone());
            self.put(Record {
                id,
                text,
                embedding,
                metadata,
            });
        }
        Ok(ids)
    }

    /// Removing the last record releases D; the next insert establishes it anew.
    pub(crate) fn remove(&mut self, id: &str) -> Option<Record> {
        let slot = self.slots.remove(id)?;
        let removed = self.records.remove(&slot);
        if self.records.is_empty() {
            self.dimension = None;
        }
        removed
    }

    pub(crate) fn remove_file(&mut self, file_path: &str) -> usize {
        let ids: Vec<String> = self
            .iter()
            .filter(|r| r.file_path() == Some(file_path))
            .map(|r| r.id.clone())
            .collect();
        for id in &ids {
            self.remove(id);
        }
        ids.len()
    }

    pub(crate) fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<DocumentMatch>> {
        if query.is_empty() {
            return Err(AppError::BadRequest("query embedding must not be empty".into()));
        }
        if let Some(expected) = self.dimension {
            if expected != query.len() {
                return Err(AppError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }
        if k == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(&Record, f32)> = self
            .iter()
            .map(|r| (r, cosine_distance(&r.embedding, query)))
            .collect();
        // Stable sort: equal distances keep insertion order.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(r, distance)| DocumentMatch {
                id: r.id.clone(),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                distance,
            })
            .collect())
    }
}
