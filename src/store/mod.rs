//! Persistence of documents, extracted text and chunk records.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::models::{ChunkRecord, Document, ExtractedText};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by record stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A document with this id already exists.
    #[error("document '{0}' already exists")]
    DuplicateDocument(String),
    /// Extracted text was already stored for this document.
    #[error("extracted text already stored for document '{0}'")]
    DuplicateExtractedText(String),
    /// A chunk with this sequence index already exists for the document.
    #[error("chunk {chunk_index} already stored for document '{document_id}'")]
    DuplicateChunk {
        /// Owning document.
        document_id: String,
        /// Conflicting sequence index.
        chunk_index: usize,
    },
    /// Referenced document does not exist.
    #[error("document '{0}' not found")]
    DocumentNotFound(String),
    /// Referenced chunk does not exist.
    #[error("chunk '{0}' not found")]
    ChunkNotFound(String),
    /// A stored row could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Storage for the relational side of ingestion.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new document.
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError>;

    /// Persist the extracted text of a document. At most one per document.
    async fn insert_extracted_text(&self, text: &ExtractedText) -> Result<(), StoreError>;

    /// Persist a chunk record.
    async fn insert_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError>;

    /// Record the vector id of a chunk after the index acknowledged it.
    async fn mark_chunk_indexed(&self, chunk_id: &str, vector_id: &str) -> Result<(), StoreError>;

    /// Fetch a document by id.
    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError>;

    /// Fetch the extracted text of a document.
    async fn get_extracted_text(
        &self,
        document_id: &str,
    ) -> Result<Option<ExtractedText>, StoreError>;

    /// Chunks of a document ordered by sequence index.
    async fn list_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Documents of a customer, newest first.
    async fn list_documents(&self, customer_id: &str) -> Result<Vec<Document>, StoreError>;
}
