//! Non-persisted [`VectorStore`] for tests and throwaway indexes.

use parking_lot::RwLock;

use super::{DocumentMatch, Metadata, Record, RecordSet, VectorStore};
use crate::error::AppResult;

#[derive(Default)]
pub struct InMemoryVectorStore {
    state: RwLock<RecordSet>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn upsert(&self, record: Record) -> AppResult<()> {
        self.state.write().upsert(record)
    }

    fn replace_file(&self, file_path: &str, records: Vec<Record>) -> AppResult<usize> {
        self.state.write().replace_file(file_path, records)
    }

    fn add_documents(
        &self,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<Metadata>,
    ) -> AppResult<Vec<String>> {
        self.state.write().add_documents(texts, embeddings, metadatas)
    }

    fn get(&self, id: &str) -> Option<Record> {
        self.state.read().get(id).cloned()
    }

    fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.state.write().remove(id).is_some())
    }

    fn delete_file(&self, file_path: &str) -> AppResult<usize> {
        Ok(self.state.write().remove_file(file_path))
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
