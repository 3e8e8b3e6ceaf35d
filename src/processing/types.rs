//! Core data types and error definitions for the ingestion and retrieval pipeline.

use crate::{
    config::Config,
    embedding::EmbeddingClientError,
    models::{Document, DocumentType},
    store::StoreError,
    uploads::UploadError,
    vector::IndexError,
};
use serde::Serialize;
use thiserror::Error;

/// Text stored when extraction produced nothing usable.
pub const EMPTY_EXTRACTION_PLACEHOLDER: &str =
    "(No text extracted from this file. Try a .txt/.docx/.pdf with selectable text.)";

/// Errors produced while splitting text into windows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Window configuration cannot make progress.
    #[error("invalid chunk parameters: size {size}, overlap {overlap} (require 0 <= overlap < size)")]
    InvalidParameter {
        /// Window length in characters.
        size: usize,
        /// Characters shared by consecutive windows.
        overlap: usize,
    },
}

/// Why a single chunk could not be indexed.
#[derive(Debug, Error)]
pub enum ChunkFailure {
    /// Embedding the chunk failed.
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Upserting the chunk failed.
    #[error("index upsert failed: {0}")]
    Index(#[from] IndexError),
}

/// Errors emitted by the ingestion orchestrator.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Upload was rejected before anything was persisted.
    #[error("invalid upload: {0}")]
    InvalidUpload(String),
    /// Writing the uploaded file failed.
    #[error(transparent)]
    Storage(#[from] UploadError),
    /// Persisting records failed.
    #[error("record store failed: {0}")]
    Store(#[from] StoreError),
    /// Chunk configuration was invalid.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// A chunk could not be embedded or indexed; acknowledged chunks keep their vector ids.
    #[error(
        "ingestion of document '{document_id}' failed at chunk {chunk_index} ({indexed}/{total} indexed): {source}"
    )]
    ChunkFailed {
        /// Document being ingested.
        document_id: String,
        /// Sequence index of the failing chunk.
        chunk_index: usize,
        /// Chunks acknowledged by the index, including any that finished after the failure.
        indexed: usize,
        /// Total chunks of the document.
        total: usize,
        /// Underlying embedding or index failure.
        #[source]
        source: ChunkFailure,
    },
    /// Referenced document does not exist.
    #[error("document '{0}' not found")]
    DocumentNotFound(String),
}

/// Errors emitted while retrieving context for a customer.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Customer id was blank.
    #[error("customer id must not be empty")]
    InvalidCustomer,
    /// Embedding the discovery query failed.
    #[error("failed to embed discovery query: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Querying the index failed.
    #[error("vector index query failed: {0}")]
    Index(#[from] IndexError),
}

/// Settings that drive ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    /// Vector index namespace.
    pub namespace: String,
    /// Window length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows.
    pub chunk_overlap: usize,
    /// Expected embedding length.
    pub embedding_dimension: usize,
    /// Chunk embed/upsert calls allowed in flight per document.
    pub concurrency: usize,
}

impl IngestSettings {
    /// Derive ingestion settings from process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            namespace: config.index_namespace.clone(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            embedding_dimension: config.embedding_dimension,
            concurrency: config.ingest_concurrency,
        }
    }
}

/// Settings that drive retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalSettings {
    /// Vector index namespace.
    pub namespace: String,
    /// Matches requested when the caller does not specify `top_k`.
    pub top_k: usize,
    /// Expected embedding length.
    pub embedding_dimension: usize,
}

impl RetrievalSettings {
    /// Derive retrieval settings from process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            namespace: config.index_namespace.clone(),
            top_k: config.retrieval_top_k,
            embedding_dimension: config.embedding_dimension,
        }
    }
}

/// Uploaded document handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Owning customer.
    pub customer_id: String,
    /// Declared document type.
    pub doc_type: DocumentType,
    /// Filename supplied by the uploader.
    pub filename: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

/// Result of a successful ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Persisted document.
    pub document: Document,
    /// Number of chunks indexed.
    pub chunk_count: usize,
}

/// Indexing progress of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestionStatus {
    /// Chunks persisted for the document.
    pub total: usize,
    /// Chunks acknowledged by the index.
    pub indexed: usize,
    /// Chunks still waiting for a vector id.
    pub pending: usize,
}

impl IngestionStatus {
    /// Whether every chunk was indexed.
    pub fn is_complete(&self) -> bool {
        self.pending == 0
    }
}
