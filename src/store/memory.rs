//! In-process [`RecordStore`] for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{RecordStore, StoreError};
use crate::models::{ChunkRecord, Document, ExtractedText};

#[derive(Default)]
struct Tables {
    documents: HashMap<String, Document>,
    texts: HashMap<String, ExtractedText>,
    chunks: Vec<ChunkRecord>,
}

/// Record store backed by in-memory maps.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if tables.documents.contains_key(&document.id) {
            return Err(StoreError::DuplicateDocument(document.id.clone()));
        }
        tables
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn insert_extracted_text(&self, text: &ExtractedText) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if !tables.documents.contains_key(&text.document_id) {
            return Err(StoreError::DocumentNotFound(text.document_id.clone()));
        }
        if tables.texts.contains_key(&text.document_id) {
            return Err(StoreError::DuplicateExtractedText(text.document_id.clone()));
        }
        tables.texts.insert(text.document_id.clone(), text.clone());
        Ok(())
    }

    async fn insert_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if !tables.documents.contains_key(&chunk.document_id) {
            return Err(StoreError::DocumentNotFound(chunk.document_id.clone()));
        }
        if tables.chunks.iter().any(|existing| {
            existing.document_id == chunk.document_id && existing.chunk_index == chunk.chunk_index
        }) {
            return Err(StoreError::DuplicateChunk {
                document_id: chunk.document_id.clone(),
                chunk_index: chunk.chunk_index,
            });
        }
        tables.chunks.push(chunk.clone());
        Ok(())
    }

    async fn mark_chunk_indexed(&self, chunk_id: &str, vector_id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let chunk = tables
            .chunks
            .iter_mut()
            .find(|chunk| chunk.id == chunk_id)
            .ok_or_else(|| StoreError::ChunkNotFound(chunk_id.to_string()))?;
        chunk.vector_id = Some(vector_id.to_string());
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.tables().documents.get(document_id).cloned())
    }

    async fn get_extracted_text(
        &self,
        document_id: &str,
    ) -> Result<Option<ExtractedText>, StoreError> {
        Ok(self.tables().texts.get(document_id).cloned())
    }

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let mut chunks: Vec<ChunkRecord> = self
            .tables()
            .chunks
            .iter()
            .filter(|chunk| chunk.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|chunk| chunk.chunk_index);
        Ok(chunks)
    }

    async fn list_documents(&self, customer_id: &str) -> Result<Vec<Document>, StoreError> {
        let mut documents: Vec<Document> = self
            .tables()
            .documents
            .values()
            .filter(|document| document.customer_id == customer_id)
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then_with(|| a.id.cmp(&b.id)));
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[tokio::test]
    async fn round_trips_records() {
        contract::round_trips_records(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn rejects_second_extracted_text() {
        contract::rejects_second_extracted_text(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn lists_chunks_in_sequence_and_marks_indexed() {
        contract::lists_chunks_in_sequence_and_marks_indexed(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn lists_customer_documents_newest_first() {
        contract::lists_customer_documents_newest_first(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn chunk_requires_existing_document() {
        let store = MemoryStore::new();
        let chunk = ChunkRecord {
            id: "c".into(),
            document_id: "ghost".into(),
            chunk_index: 0,
            text: "t".into(),
            vector_id: None,
        };
        assert!(matches!(
            store.insert_chunk(&chunk).await,
            Err(StoreError::DocumentNotFound(_))
        ));
    }
}
