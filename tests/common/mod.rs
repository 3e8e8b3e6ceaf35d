//! Fakes and builders shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clarify_ingest::{
    embedding::{EmbeddingClient, EmbeddingClientError, HashEmbeddingClient},
    metrics::IngestMetrics,
    processing::{IngestSettings, IngestionService, RetrievalSettings, Retriever},
    models::{ChunkRecord, Document, ExtractedText},
    store::{MemoryStore, RecordStore, StoreError},
    uploads::UploadStore,
    vector::{IndexError, MemoryIndex, VectorIndex, VectorMatch, VectorQuery, VectorRecord},
};
use tempfile::TempDir;

pub const NAMESPACE: &str = "clarify-test";
pub const DIMENSION: usize = 16;

/// Embedding client that fails exactly one call, identified by its position, until healed.
pub struct FlakyEmbedder {
    inner: HashEmbeddingClient,
    fail_on_call: usize,
    calls: AtomicUsize,
    healed: AtomicBool,
}

impl FlakyEmbedder {
    pub fn failing_on_call(fail_on_call: usize) -> Self {
        Self {
            inner: HashEmbeddingClient::new(DIMENSION),
            fail_on_call,
            calls: AtomicUsize::new(0),
            healed: AtomicBool::new(false),
        }
    }

    pub fn heal(&self) {
        self.healed.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingClient for FlakyEmbedder {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == self.fail_on_call && !self.healed.load(Ordering::SeqCst) {
            return Err(EmbeddingClientError::GenerationFailed("quota exceeded".into()));
        }
        self.inner.generate_embeddings(texts).await
    }
}

/// Memory index that can be switched off and records every upserted id.
#[derive(Default)]
pub struct SwitchableIndex {
    pub inner: MemoryIndex,
    down: AtomicBool,
    upserted: Mutex<Vec<String>>,
}

impl SwitchableIndex {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn upserted_ids(&self) -> HashSet<String> {
        self.upserted.lock().unwrap().iter().cloned().collect()
    }
}

#[async_trait]
impl VectorIndex for SwitchableIndex {
    async fn upsert(&self, namespace: &str, record: VectorRecord) -> Result<(), IndexError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("connection refused".into()));
        }
        self.upserted.lock().unwrap().push(record.id.clone());
        self.inner.upsert(namespace, record).await
    }

    async fn query(
        &self,
        namespace: &str,
        query: VectorQuery,
    ) -> Result<Vec<VectorMatch>, IndexError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(IndexError::Unavailable("connection refused".into()));
        }
        self.inner.query(namespace, query).await
    }
}

/// Memory store whose document or chunk inserts can be made to fail.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    pub fail_documents: AtomicBool,
    pub fail_chunks: AtomicBool,
}

fn injected() -> StoreError {
    StoreError::Corrupt("disk full".into())
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        if self.fail_documents.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.insert_document(document).await
    }

    async fn insert_extracted_text(&self, text: &ExtractedText) -> Result<(), StoreError> {
        self.inner.insert_extracted_text(text).await
    }

    async fn insert_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        if self.fail_chunks.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.insert_chunk(chunk).await
    }

    async fn mark_chunk_indexed(&self, chunk_id: &str, vector_id: &str) -> Result<(), StoreError> {
        self.inner.mark_chunk_indexed(chunk_id, vector_id).await
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get_document(document_id).await
    }

    async fn get_extracted_text(
        &self,
        document_id: &str,
    ) -> Result<Option<ExtractedText>, StoreError> {
        self.inner.get_extracted_text(document_id).await
    }

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        self.inner.list_chunks(document_id).await
    }

    async fn list_documents(&self, customer_id: &str) -> Result<Vec<Document>, StoreError> {
        self.inner.list_documents(customer_id).await
    }
}

pub fn ingest_settings(chunk_size: usize, chunk_overlap: usize, concurrency: usize) -> IngestSettings {
    IngestSettings {
        namespace: NAMESPACE.into(),
        chunk_size,
        chunk_overlap,
        embedding_dimension: DIMENSION,
        concurrency,
    }
}

pub fn retrieval_settings() -> RetrievalSettings {
    RetrievalSettings {
        namespace: NAMESPACE.into(),
        top_k: 12,
        embedding_dimension: DIMENSION,
    }
}

/// Fully wired pipeline over injected fakes.
pub struct Harness {
    pub uploads: TempDir,
    pub index: Arc<SwitchableIndex>,
    pub store: Arc<dyn RecordStore>,
    pub metrics: Arc<IngestMetrics>,
    pub ingestion: Arc<IngestionService>,
    pub retriever: Arc<Retriever>,
}

impl Harness {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn RecordStore>,
        settings: IngestSettings,
    ) -> Self {
        let uploads = TempDir::new().unwrap();
        let index = Arc::new(SwitchableIndex::default());
        let metrics = Arc::new(IngestMetrics::new());
        let ingestion = IngestionService::new(
            embedder.clone(),
            index.clone(),
            store.clone(),
            UploadStore::new(uploads.path()),
            settings,
            metrics.clone(),
        )
        .expect("valid settings");
        let retriever = Retriever::new(
            embedder,
            index.clone(),
            retrieval_settings(),
            metrics.clone(),
        );
        Self {
            uploads,
            index,
            store,
            metrics,
            ingestion: Arc::new(ingestion),
            retriever: Arc::new(retriever),
        }
    }
}
