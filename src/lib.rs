#![deny(missing_docs)]

//! Document ingestion and customer-scoped retrieval for requirements-clarification
//! questionnaires.
//!
//! Uploaded files are stored, extracted to text, split into overlapping character windows,
//! embedded and indexed under a namespace with per-fragment metadata. The retriever later
//! issues a fixed discovery query filtered to one customer and returns ranked fragments.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text extraction from uploaded files.
pub mod extract;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and retrieval counters.
pub mod metrics;
/// Records exchanged across the pipeline.
pub mod models;
/// Chunking, ingestion orchestration and retrieval.
pub mod processing;
/// Qdrant vector index adapter.
pub mod qdrant;
/// Relational record persistence.
pub mod store;
/// Upload file storage.
pub mod uploads;
/// Vector index abstraction and in-memory implementation.
pub mod vector;
