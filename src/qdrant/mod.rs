//! Qdrant-backed [`crate::vector::VectorIndex`].
//!
//! Each namespace maps to one Qdrant collection. Qdrant only accepts UUID or integer point
//! ids, so chunk vector ids are mapped to name-based UUIDs and the original id travels in the
//! payload under `vector_id`.

pub mod client;
pub mod filters;
pub mod payload;
pub mod types;

pub use client::QdrantIndex;
pub use filters::build_filter;
pub use payload::point_id_for;
