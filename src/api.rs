//! HTTP surface for the ingestion pipeline.
//!
//! A compact Axum router standing in for the application's web layer:
//!
//! - `POST /customers/:customer_id/documents/upload` – multipart upload (`doc_type`, `file`);
//!   stores, extracts, chunks and indexes the document, returning it with its chunk count.
//! - `GET /customers/:customer_id/documents` – documents of a customer, newest first.
//! - `GET /customers/:customer_id/documents/:document_id/status` – indexed/pending chunk counts.
//! - `POST /customers/:customer_id/documents/:document_id/reindex` – retry pending chunks.
//! - `GET /customers/:customer_id/context?top_k=N` – discovery fragments for questionnaire
//!   generation.
//! - `GET /health` and `GET /metrics`.
//!
//! Errors are returned as `{ "error": "..." }` with a status reflecting the failing layer.

use crate::metrics::IngestMetrics;
use crate::models::{Document, DocumentType, RetrievedFragment};
use crate::processing::{
    DISCOVERY_QUERY, IngestionError, IngestionService, IngestionStatus, RetrievalError, Retriever,
    UploadRequest,
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Shared handles used by the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Ingestion orchestrator.
    pub ingestion: Arc<IngestionService>,
    /// Discovery retriever.
    pub retriever: Arc<Retriever>,
    /// Counters reported by `GET /metrics`.
    pub metrics: Arc<IngestMetrics>,
}

/// Build the HTTP router. `max_upload_bytes` bounds the request body of uploads.
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route(
            "/customers/:customer_id/documents/upload",
            post(upload_document).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/customers/:customer_id/documents", get(list_documents))
        .route(
            "/customers/:customer_id/documents/:document_id/status",
            get(document_status),
        )
        .route(
            "/customers/:customer_id/documents/:document_id/reindex",
            post(reindex_document),
        )
        .route("/customers/:customer_id/context", get(customer_context))
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

/// Document as returned by the API.
#[derive(Serialize)]
struct DocumentResponse {
    document_id: String,
    customer_id: String,
    doc_type: DocumentType,
    filename: String,
    storage_path: String,
    uploaded_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk_count: Option<usize>,
}

impl DocumentResponse {
    fn new(document: Document, chunk_count: Option<usize>) -> Self {
        let uploaded_at = document.uploaded_at_iso();
        Self {
            document_id: document.id,
            customer_id: document.customer_id,
            doc_type: document.doc_type,
            filename: document.filename,
            storage_path: document.storage_path,
            uploaded_at,
            chunk_count,
        }
    }
}

/// Store and index an uploaded document.
async fn upload_document(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentResponse>), AppError> {
    let mut doc_type = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("doc_type") => {
                let raw = field.text().await?;
                doc_type = Some(
                    raw.parse::<DocumentType>()
                        .map_err(|error| AppError::BadRequest(error.to_string()))?,
                );
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                file = Some((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let doc_type = doc_type.ok_or_else(|| AppError::BadRequest("missing field 'doc_type'".into()))?;
    let (filename, bytes) =
        file.ok_or_else(|| AppError::BadRequest("missing field 'file'".into()))?;

    let outcome = state
        .ingestion
        .ingest(UploadRequest {
            customer_id,
            doc_type,
            filename,
            bytes,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse::new(
            outcome.document,
            Some(outcome.chunk_count),
        )),
    ))
}

/// List a customer's documents.
async fn list_documents(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Result<Json<Vec<DocumentResponse>>, AppError> {
    let documents = state.ingestion.list_documents(&customer_id).await?;
    Ok(Json(
        documents
            .into_iter()
            .map(|document| DocumentResponse::new(document, None))
            .collect(),
    ))
}

#[derive(Serialize)]
struct StatusResponse {
    document_id: String,
    #[serde(flatten)]
    status: IngestionStatus,
    complete: bool,
}

impl StatusResponse {
    fn new(document_id: String, status: IngestionStatus) -> Self {
        Self {
            document_id,
            complete: status.is_complete(),
            status,
        }
    }
}

/// Report indexing progress of a document.
async fn document_status(
    State(state): State<AppState>,
    Path((customer_id, document_id)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, AppError> {
    state
        .ingestion
        .customer_document(&customer_id, &document_id)
        .await?;
    let status = state.ingestion.ingestion_status(&document_id).await?;
    Ok(Json(StatusResponse::new(document_id, status)))
}

/// Retry chunks that were never indexed.
async fn reindex_document(
    State(state): State<AppState>,
    Path((customer_id, document_id)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, AppError> {
    state
        .ingestion
        .customer_document(&customer_id, &document_id)
        .await?;
    let status = state.ingestion.reindex_pending(&document_id).await?;
    Ok(Json(StatusResponse::new(document_id, status)))
}

#[derive(Deserialize)]
struct ContextParams {
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct ContextResponse {
    customer_id: String,
    query: &'static str,
    fragments: Vec<RetrievedFragment>,
}

/// Retrieve discovery fragments for a customer.
async fn customer_context(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    Query(params): Query<ContextParams>,
) -> Result<Json<ContextResponse>, AppError> {
    let fragments = state.retriever.retrieve(&customer_id, params.top_k).await?;
    Ok(Json(ContextResponse {
        customer_id,
        query: DISCOVERY_QUERY,
        fragments,
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_metrics(State(state): State<AppState>) -> Json<crate::metrics::MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

enum AppError {
    BadRequest(String),
    Multipart(MultipartError),
    Ingestion(IngestionError),
    Retrieval(RetrievalError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            AppError::Multipart(error) => (
                error.status(),
                json!({ "error": format!("invalid multipart body: {}", error.body_text()) }),
            ),
            AppError::Ingestion(error) => {
                let status = match &error {
                    IngestionError::InvalidUpload(_) | IngestionError::Chunking(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    IngestionError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
                    IngestionError::ChunkFailed { .. } => StatusCode::BAD_GATEWAY,
                    IngestionError::Storage(_) | IngestionError::Store(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                let body = match &error {
                    IngestionError::ChunkFailed {
                        document_id,
                        chunk_index,
                        indexed,
                        total,
                        ..
                    } => json!({
                        "error": error.to_string(),
                        "document_id": document_id,
                        "chunk_index": chunk_index,
                        "indexed": indexed,
                        "total": total,
                    }),
                    _ => json!({ "error": error.to_string() }),
                };
                (status, body)
            }
            AppError::Retrieval(error) => {
                let status = match &error {
                    RetrievalError::InvalidCustomer => StatusCode::BAD_REQUEST,
                    RetrievalError::Embedding(_) | RetrievalError::Index(_) => {
                        StatusCode::BAD_GATEWAY
                    }
                };
                (status, json!({ "error": error.to_string() }))
            }
        };
        if status.is_server_error() {
            tracing::error!(status = %status, body = %body, "Request failed");
        }
        (status, Json(body)).into_response()
    }
}

impl From<IngestionError> for AppError {
    fn from(inner: IngestionError) -> Self {
        Self::Ingestion(inner)
    }
}

impl From<RetrievalError> for AppError {
    fn from(inner: RetrievalError) -> Self {
        Self::Retrieval(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Multipart(inner)
    }
}
