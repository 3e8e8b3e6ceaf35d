//! Ingestion orchestrator: storage, extraction, chunking, embedding and indexing of one upload.

use crate::{
    embedding::{EmbeddingClient, ensure_dimension},
    extract::extract_text_blocking,
    metrics::IngestMetrics,
    models::{ChunkRecord, Document, ExtractedText, vector_id},
    processing::{
        chunking::{chunk_text, validate_window},
        types::{
            ChunkFailure, ChunkingError, EMPTY_EXTRACTION_PLACEHOLDER, IngestOutcome,
            IngestSettings, IngestionError, IngestionStatus, UploadRequest,
        },
    },
    store::RecordStore,
    uploads::{UploadError, UploadStore},
    vector::{FragmentMetadata, VectorIndex, VectorRecord},
};
use futures_util::{FutureExt, StreamExt, stream};
use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use time::OffsetDateTime;
use uuid::Uuid;

enum ChunkOutcome {
    Indexed(String),
    Failed(ChunkFailure),
    Skipped,
}

/// Drives one document from uploaded bytes to indexed chunks.
///
/// Every collaborator is injected, so tests can substitute in-memory fakes. A chunk row only
/// carries a vector id once the index acknowledged its upsert; when a chunk fails, it and every
/// chunk that was not acknowledged are stored without one and the upload fails with
/// [`IngestionError::ChunkFailed`]. [`IngestionService::reindex_pending`] finishes the job later.
pub struct IngestionService {
    embedding_client: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn RecordStore>,
    uploads: UploadStore,
    settings: IngestSettings,
    metrics: Arc<IngestMetrics>,
}

impl IngestionService {
    /// Assemble the orchestrator, rejecting impossible chunk settings up front.
    pub fn new(
        embedding_client: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn RecordStore>,
        uploads: UploadStore,
        settings: IngestSettings,
        metrics: Arc<IngestMetrics>,
    ) -> Result<Self, ChunkingError> {
        validate_window(settings.chunk_size, settings.chunk_overlap)?;
        Ok(Self {
            embedding_client,
            index,
            store,
            uploads,
            settings,
            metrics,
        })
    }

    /// Ingest one uploaded document.
    ///
    /// Once the document row exists, every failure is counted in the metrics and leaves the
    /// row in place for diagnosis.
    pub async fn ingest(&self, request: UploadRequest) -> Result<IngestOutcome, IngestionError> {
        let UploadRequest {
            customer_id,
            doc_type,
            filename,
            bytes,
        } = request;
        let document_id = Uuid::new_v4().to_string();
        tracing::info!(
            customer_id = %customer_id,
            document_id = %document_id,
            doc_type = %doc_type,
            filename = %filename,
            bytes = bytes.len(),
            "Ingesting document"
        );

        let path = self
            .uploads
            .save(&customer_id, &document_id, &filename, &bytes)
            .await
            .map_err(|error| match error {
                UploadError::Io(_) => IngestionError::Storage(error),
                other => IngestionError::InvalidUpload(other.to_string()),
            })?;

        let document = Document {
            id: document_id,
            customer_id,
            doc_type,
            filename,
            storage_path: path.to_string_lossy().into_owned(),
            uploaded_at: OffsetDateTime::now_utc(),
        };
        if let Err(error) = self.store.insert_document(&document).await {
            self.metrics.record_failure();
            if let Err(cleanup) = self.uploads.remove(&path).await {
                tracing::warn!(path = %path.display(), error = %cleanup, "Failed to discard upload");
            }
            return Err(error.into());
        }

        match self.process_document(&document, path).await {
            Ok(indexed) => {
                self.metrics.record_document(indexed as u64);
                tracing::info!(
                    customer_id = %document.customer_id,
                    document_id = %document.id,
                    chunks = indexed,
                    "Document indexed"
                );
                Ok(IngestOutcome {
                    document,
                    chunk_count: indexed,
                })
            }
            Err(error) => {
                self.metrics.record_failure();
                if !matches!(error, IngestionError::ChunkFailed { .. }) {
                    tracing::error!(document_id = %document.id, %error, "Ingestion failed");
                }
                Err(error)
            }
        }
    }

    /// Extract, store and chunk the text of a recorded document, then index the chunks.
    async fn process_document(
        &self,
        document: &Document,
        path: PathBuf,
    ) -> Result<usize, IngestionError> {
        let mut text = extract_text_blocking(path).await;
        if text.is_empty() {
            tracing::warn!(
                document_id = %document.id,
                "Extraction produced no text; storing placeholder"
            );
            text = EMPTY_EXTRACTION_PLACEHOLDER.to_string();
        }
        self.store
            .insert_extracted_text(&ExtractedText {
                id: Uuid::new_v4().to_string(),
                document_id: document.id.clone(),
                text: text.clone(),
            })
            .await?;

        let chunks = chunk_text(&text, self.settings.chunk_size, self.settings.chunk_overlap)?;
        tracing::debug!(
            document_id = %document.id,
            chunks = chunks.len(),
            chunk_size = self.settings.chunk_size,
            overlap = self.settings.chunk_overlap,
            "Chunked document"
        );

        self.index_new_chunks(document, chunks).await
    }

    /// Embed, upsert and persist chunks in sequence order; returns the number indexed.
    ///
    /// After the first failure no further chunk is started, but chunks already in flight are
    /// awaited: an acknowledged upsert always ends up with its vector id.
    async fn index_new_chunks(
        &self,
        document: &Document,
        chunks: Vec<String>,
    ) -> Result<usize, IngestionError> {
        let total = chunks.len();
        let stopped = AtomicBool::new(false);
        let stopped = &stopped;

        let jobs = chunks.into_iter().enumerate().map(|(chunk_index, text)| {
            async move {
                if stopped.load(Ordering::SeqCst) {
                    return (chunk_index, text, ChunkOutcome::Skipped);
                }
                let outcome = match self.index_chunk(document, chunk_index, &text).await {
                    Ok(vector_id) => ChunkOutcome::Indexed(vector_id),
                    Err(source) => {
                        stopped.store(true, Ordering::SeqCst);
                        ChunkOutcome::Failed(source)
                    }
                };
                (chunk_index, text, outcome)
            }
            .boxed()
        });
        let mut results = stream::iter(jobs).buffered(self.settings.concurrency.max(1));

        let mut indexed = 0;
        let mut failure = None;
        while let Some((chunk_index, text, outcome)) = results.next().await {
            let vector_id = match outcome {
                ChunkOutcome::Indexed(vector_id) => {
                    indexed += 1;
                    Some(vector_id)
                }
                ChunkOutcome::Failed(source) => {
                    failure.get_or_insert((chunk_index, source));
                    None
                }
                ChunkOutcome::Skipped => None,
            };
            self.persist_chunk(document, chunk_index, &text, vector_id)
                .await?;
        }

        let Some((failed_index, source)) = failure else {
            return Ok(indexed);
        };

        tracing::error!(
            document_id = %document.id,
            chunk_index = failed_index,
            indexed,
            total,
            error = %source,
            "Chunk indexing failed; unacknowledged chunks left pending"
        );
        self.metrics.record_chunks(indexed as u64);

        Err(IngestionError::ChunkFailed {
            document_id: document.id.clone(),
            chunk_index: failed_index,
            indexed,
            total,
            source,
        })
    }

    async fn index_chunk(
        &self,
        document: &Document,
        chunk_index: usize,
        text: &str,
    ) -> Result<String, ChunkFailure> {
        let vector = self.embedding_client.embed(text).await?;
        ensure_dimension(&vector, self.settings.embedding_dimension)?;

        let id = vector_id(&document.id, chunk_index);
        let record = VectorRecord {
            id: id.clone(),
            values: vector,
            metadata: FragmentMetadata {
                customer_id: document.customer_id.clone(),
                document_id: document.id.clone(),
                chunk_index,
                doc_type: document.doc_type,
                uploaded_at: document.uploaded_at_iso(),
                text: text.to_string(),
            },
        };
        self.index.upsert(&self.settings.namespace, record).await?;
        tracing::debug!(document_id = %document.id, chunk_index, vector_id = %id, "Chunk indexed");
        Ok(id)
    }

    async fn persist_chunk(
        &self,
        document: &Document,
        chunk_index: usize,
        text: &str,
        vector_id: Option<String>,
    ) -> Result<(), IngestionError> {
        self.store
            .insert_chunk(&ChunkRecord {
                id: Uuid::new_v4().to_string(),
                document_id: document.id.clone(),
                chunk_index,
                text: text.to_string(),
                vector_id,
            })
            .await?;
        Ok(())
    }

    /// Report how many chunks of a document were indexed.
    pub async fn ingestion_status(
        &self,
        document_id: &str,
    ) -> Result<IngestionStatus, IngestionError> {
        self.require_document(document_id).await?;
        let chunks = self.store.list_chunks(document_id).await?;
        let indexed = chunks.iter().filter(|chunk| chunk.is_indexed()).count();
        Ok(IngestionStatus {
            total: chunks.len(),
            indexed,
            pending: chunks.len() - indexed,
        })
    }

    /// Retry the chunks of a document that were never acknowledged by the index.
    ///
    /// Chunks are retried in sequence order; the first failure stops the retry with
    /// [`IngestionError::ChunkFailed`]. Already indexed chunks are left untouched.
    pub async fn reindex_pending(
        &self,
        document_id: &str,
    ) -> Result<IngestionStatus, IngestionError> {
        let document = self.require_document(document_id).await?;
        let chunks = self.store.list_chunks(document_id).await?;
        let total = chunks.len();
        let mut indexed = chunks.iter().filter(|chunk| chunk.is_indexed()).count();
        tracing::info!(document_id, pending = total - indexed, "Retrying pending chunks");

        for chunk in chunks.iter().filter(|chunk| !chunk.is_indexed()) {
            match self
                .index_chunk(&document, chunk.chunk_index, &chunk.text)
                .await
            {
                Ok(vector_id) => {
                    self.store.mark_chunk_indexed(&chunk.id, &vector_id).await?;
                    self.metrics.record_chunks(1);
                    indexed += 1;
                }
                Err(source) => {
                    tracing::error!(
                        document_id,
                        chunk_index = chunk.chunk_index,
                        error = %source,
                        "Chunk retry failed"
                    );
                    self.metrics.record_failure();
                    return Err(IngestionError::ChunkFailed {
                        document_id: document_id.to_string(),
                        chunk_index: chunk.chunk_index,
                        indexed,
                        total,
                        source,
                    });
                }
            }
        }

        Ok(IngestionStatus {
            total,
            indexed,
            pending: total - indexed,
        })
    }

    /// Documents of a customer, newest first.
    pub async fn list_documents(&self, customer_id: &str) -> Result<Vec<Document>, IngestionError> {
        Ok(self.store.list_documents(customer_id).await?)
    }

    /// Fetch a document, treating documents of other customers as missing.
    pub async fn customer_document(
        &self,
        customer_id: &str,
        document_id: &str,
    ) -> Result<Document, IngestionError> {
        let document = self.require_document(document_id).await?;
        if document.customer_id != customer_id {
            return Err(IngestionError::DocumentNotFound(document_id.to_string()));
        }
        Ok(document)
    }

    async fn require_document(&self, document_id: &str) -> Result<Document, IngestionError> {
        self.store
            .get_document(document_id)
            .await?
            .ok_or_else(|| IngestionError::DocumentNotFound(document_id.to_string()))
    }
}
