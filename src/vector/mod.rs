//! Vector index abstraction shared by the ingestion orchestrator and the retriever.
//!
//! The index stores one vector per chunk under a caller-supplied id inside a namespace and
//! answers nearest-neighbour queries restricted by equality filters on fragment metadata.
//! Metadata crosses this boundary as [`FragmentMetadata`]; adapters persist it as a flat
//! key/value payload and hand raw payloads back so callers can validate them.

mod memory;

pub use memory::MemoryIndex;

use crate::models::DocumentType;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Payload key holding the customer identifier.
pub const FIELD_CUSTOMER_ID: &str = "customer_id";
/// Payload key holding the document identifier.
pub const FIELD_DOCUMENT_ID: &str = "document_id";
/// Payload key holding the chunk sequence index.
pub const FIELD_CHUNK_INDEX: &str = "chunk_index";
/// Payload key holding the declared document type.
pub const FIELD_DOC_TYPE: &str = "doc_type";
/// Payload key holding the upload timestamp.
pub const FIELD_UPLOADED_AT: &str = "uploaded_at";
/// Payload key holding the fragment text.
pub const FIELD_TEXT: &str = "text";

/// Errors returned while talking to a vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid index URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed for a reason other than reachability.
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),
    /// The index responded with an unexpected status code.
    #[error("Unexpected index response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the index.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The index rejected a record before storing it.
    #[error("Invalid vector record: {0}")]
    InvalidRecord(String),
    /// The index could not be reached or refused to serve the request.
    #[error("Vector index unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for IndexError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            Self::Unavailable(error.to_string())
        } else {
            Self::Http(error)
        }
    }
}

/// Errors raised when a payload does not describe a valid fragment.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Payload fields were missing or had the wrong shape.
    #[error("malformed fragment metadata: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A required field was present but empty.
    #[error("fragment metadata field '{0}' is empty")]
    EmptyField(&'static str),
    /// The upload timestamp is not ISO-8601.
    #[error("fragment metadata field 'uploaded_at' is not RFC 3339: {0}")]
    InvalidTimestamp(String),
}

/// Metadata stored alongside every chunk vector.
///
/// The field set is part of the index wire contract: retrieval filters on `customer_id`, and
/// question generation consumes the rest. Renaming or adding fields requires a new namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentMetadata {
    /// Customer that owns the source document.
    pub customer_id: String,
    /// Source document.
    pub document_id: String,
    /// Zero-based position of the chunk within the document.
    pub chunk_index: usize,
    /// Declared type of the source document.
    pub doc_type: DocumentType,
    /// Upload timestamp of the source document (ISO-8601).
    pub uploaded_at: String,
    /// Fragment text.
    pub text: String,
}

impl FragmentMetadata {
    /// Parse and validate a raw index payload. Unknown keys are ignored.
    pub fn from_payload(payload: Map<String, Value>) -> Result<Self, MetadataError> {
        let metadata: FragmentMetadata = serde_json::from_value(Value::Object(payload))?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Serialize into a flat payload object.
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert(FIELD_CUSTOMER_ID.into(), Value::String(self.customer_id.clone()));
        payload.insert(FIELD_DOCUMENT_ID.into(), Value::String(self.document_id.clone()));
        payload.insert(FIELD_CHUNK_INDEX.into(), Value::from(self.chunk_index));
        payload.insert(
            FIELD_DOC_TYPE.into(),
            Value::String(self.doc_type.as_str().to_string()),
        );
        payload.insert(FIELD_UPLOADED_AT.into(), Value::String(self.uploaded_at.clone()));
        payload.insert(FIELD_TEXT.into(), Value::String(self.text.clone()));
        payload
    }

    /// Check the invariants the retriever relies on.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.customer_id.trim().is_empty() {
            return Err(MetadataError::EmptyField(FIELD_CUSTOMER_ID));
        }
        if self.document_id.trim().is_empty() {
            return Err(MetadataError::EmptyField(FIELD_DOCUMENT_ID));
        }
        OffsetDateTime::parse(&self.uploaded_at, &Rfc3339)
            .map_err(|_| MetadataError::InvalidTimestamp(self.uploaded_at.clone()))?;
        Ok(())
    }
}

/// Equality constraints applied to fragment metadata during a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    /// Exact match on `customer_id`.
    pub customer_id: Option<String>,
    /// Exact match on `document_id`.
    pub document_id: Option<String>,
    /// Exact match on `doc_type`.
    pub doc_type: Option<DocumentType>,
}

impl MetadataFilter {
    /// Restrict matches to one customer.
    pub fn for_customer(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: Some(customer_id.into()),
            ..Self::default()
        }
    }

    /// Field/value pairs that must all match, in a stable order.
    pub fn conditions(&self) -> Vec<(&'static str, String)> {
        let mut conditions = Vec::new();
        if let Some(customer_id) = &self.customer_id {
            conditions.push((FIELD_CUSTOMER_ID, customer_id.clone()));
        }
        if let Some(document_id) = &self.document_id {
            conditions.push((FIELD_DOCUMENT_ID, document_id.clone()));
        }
        if let Some(doc_type) = self.doc_type {
            conditions.push((FIELD_DOC_TYPE, doc_type.as_str().to_string()));
        }
        conditions
    }

    /// Whether the metadata satisfies every constraint.
    pub fn matches(&self, metadata: &FragmentMetadata) -> bool {
        self.customer_id
            .as_ref()
            .is_none_or(|value| *value == metadata.customer_id)
            && self
                .document_id
                .as_ref()
                .is_none_or(|value| *value == metadata.document_id)
            && self.doc_type.is_none_or(|value| value == metadata.doc_type)
    }
}

/// Vector plus metadata submitted to [`VectorIndex::upsert`].
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Caller-supplied identifier; an existing entry with the same id is replaced.
    pub id: String,
    /// Embedding values.
    pub values: Vec<f32>,
    /// Fragment metadata stored with the vector.
    pub metadata: FragmentMetadata,
}

/// Similarity query parameters.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    /// Query embedding.
    pub vector: Vec<f32>,
    /// Maximum number of matches returned.
    pub top_k: usize,
    /// Equality constraints on metadata.
    pub filter: MetadataFilter,
    /// Whether payloads should be returned with each match.
    pub include_metadata: bool,
}

/// Scored match returned by [`VectorIndex::query`].
#[derive(Debug, Clone)]
pub struct VectorMatch {
    /// Identifier the vector was stored under.
    pub id: String,
    /// Similarity score; higher is more similar.
    pub score: f32,
    /// Raw payload, when requested and present.
    pub metadata: Option<Map<String, Value>>,
}

/// Interface implemented by vector index backends.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the vector stored under `record.id` in `namespace`.
    async fn upsert(&self, namespace: &str, record: VectorRecord) -> Result<(), IndexError>;

    /// Return at most `query.top_k` matches ordered by descending similarity.
    async fn query(
        &self,
        namespace: &str,
        query: VectorQuery,
    ) -> Result<Vec<VectorMatch>, IndexError>;
}
