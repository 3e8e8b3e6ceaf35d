//! Records produced by ingestion and the ephemeral fragments returned by retrieval.

use crate::vector::FragmentMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Declared kind of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Minutes captured during a customer meeting.
    MeetingMinutes,
    /// A requirements document.
    Requirements,
    /// Email correspondence.
    Email,
    /// A previously answered questionnaire.
    Questionnaire,
}

impl DocumentType {
    /// Every accepted document type, in declaration order.
    pub const ALL: [DocumentType; 4] = [
        DocumentType::MeetingMinutes,
        DocumentType::Requirements,
        DocumentType::Email,
        DocumentType::Questionnaire,
    ];

    /// Wire representation stored in records and index metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::MeetingMinutes => "meeting_minutes",
            DocumentType::Requirements => "requirements",
            DocumentType::Email => "email",
            DocumentType::Questionnaire => "questionnaire",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a [`DocumentType`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown document type '{0}' (expected meeting_minutes, requirements, email, or questionnaire)")]
pub struct UnknownDocumentType(pub String);

impl std::str::FromStr for DocumentType {
    type Err = UnknownDocumentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim();
        DocumentType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownDocumentType(normalized.to_string()))
    }
}

/// An uploaded document. Created once per upload and never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document identifier (UUID v4).
    pub id: String,
    /// Customer that owns the document.
    pub customer_id: String,
    /// Declared document type.
    pub doc_type: DocumentType,
    /// Filename supplied by the uploader.
    pub filename: String,
    /// Location the file was written to, recorded verbatim.
    pub storage_path: String,
    /// Upload instant (UTC).
    pub uploaded_at: OffsetDateTime,
}

impl Document {
    /// Upload timestamp formatted as ISO-8601 (RFC 3339).
    pub fn uploaded_at_iso(&self) -> String {
        format_timestamp(self.uploaded_at)
    }
}

/// Full normalized text extracted from a document; one per document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// Record identifier.
    pub id: String,
    /// Owning document.
    pub document_id: String,
    /// Extracted text, or the placeholder when extraction produced nothing.
    pub text: String,
}

/// Persisted chunk of a document's extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Record identifier.
    pub id: String,
    /// Owning document.
    pub document_id: String,
    /// Zero-based position of the chunk within the document.
    pub chunk_index: usize,
    /// Fragment text.
    pub text: String,
    /// Identifier the vector was stored under; `None` until the index acknowledged it.
    pub vector_id: Option<String>,
}

impl ChunkRecord {
    /// Whether the vector index acknowledged this chunk.
    pub fn is_indexed(&self) -> bool {
        self.vector_id.is_some()
    }
}

/// Fragment returned by a similarity query, ready for question generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedFragment {
    /// Customer that owns the source document.
    pub customer_id: String,
    /// Source document.
    pub document_id: String,
    /// Position of the chunk within the source document.
    pub chunk_index: usize,
    /// Declared type of the source document.
    pub doc_type: DocumentType,
    /// Upload timestamp of the source document (ISO-8601).
    pub uploaded_at: String,
    /// Fragment text.
    pub text: String,
    /// One-based similarity rank.
    pub rank: usize,
    /// Similarity score reported by the index.
    pub score: f32,
}

impl RetrievedFragment {
    /// Attach a rank and score to index metadata.
    pub fn from_metadata(metadata: FragmentMetadata, rank: usize, score: f32) -> Self {
        let FragmentMetadata {
            customer_id,
            document_id,
            chunk_index,
            doc_type,
            uploaded_at,
            text,
        } = metadata;
        Self {
            customer_id,
            document_id,
            chunk_index,
            doc_type,
            uploaded_at,
            text,
            rank,
            score,
        }
    }
}

/// Identifier under which a chunk's vector is stored: `"<document-id>_<chunk-index>"`.
pub fn vector_id(document_id: &str, chunk_index: usize) -> String {
    format!("{document_id}_{chunk_index}")
}

/// Format a timestamp as RFC 3339.
pub fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn document_type_round_trips_wire_names() {
        for kind in DocumentType::ALL {
            assert_eq!(kind.as_str().parse::<DocumentType>(), Ok(kind));
        }
        assert_eq!(
            "contract".parse::<DocumentType>(),
            Err(UnknownDocumentType("contract".into()))
        );
    }

    #[test]
    fn document_type_serializes_snake_case() {
        let value = serde_json::to_value(DocumentType::MeetingMinutes).unwrap();
        assert_eq!(value, "meeting_minutes");
    }

    #[test]
    fn vector_id_joins_document_and_index() {
        assert_eq!(vector_id("doc-1", 0), "doc-1_0");
        assert_eq!(vector_id("doc-1", 12), "doc-1_12");
    }

    #[test]
    fn uploaded_at_is_iso_8601() {
        let document = Document {
            id: "doc".into(),
            customer_id: "acme".into(),
            doc_type: DocumentType::Email,
            filename: "mail.txt".into(),
            storage_path: "uploads/acme/doc_mail.txt".into(),
            uploaded_at: datetime!(2025-03-04 05:06:07 UTC),
        };
        assert_eq!(document.uploaded_at_iso(), "2025-03-04T05:06:07Z");
    }
}
