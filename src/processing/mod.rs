//! Document pipeline: chunking, ingestion orchestration and customer-scoped retrieval.

pub mod chunking;
mod retrieval;
mod service;
pub mod types;

pub use retrieval::{DISCOVERY_QUERY, Retriever};
pub use service::IngestionService;
pub use types::{
    ChunkFailure, ChunkingError, EMPTY_EXTRACTION_PLACEHOLDER, IngestOutcome, IngestSettings,
    IngestionError, IngestionStatus, RetrievalError, RetrievalSettings, UploadRequest,
};
