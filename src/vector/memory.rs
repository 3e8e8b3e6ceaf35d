//! In-process [`VectorIndex`] used for local runs and tests.
//!
//! Vectors live in a namespace-partitioned map behind a `RwLock`. Queries are brute-force
//! cosine similarity over the namespace, filtered before ranking.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{FragmentMetadata, IndexError, VectorIndex, VectorMatch, VectorQuery, VectorRecord};

struct StoredVector {
    values: Vec<f32>,
    metadata: FragmentMetadata,
}

/// Namespace-partitioned in-memory vector index.
#[derive(Default)]
pub struct MemoryIndex {
    namespaces: RwLock<HashMap<String, HashMap<String, StoredVector>>>,
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vectors stored in `namespace`.
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .map_or(0, HashMap::len)
    }

    /// Whether `namespace` holds no vectors.
    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }

    /// Metadata stored under `id`, if any.
    pub fn metadata(&self, namespace: &str, id: &str) -> Option<FragmentMetadata> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .and_then(|vectors| vectors.get(id))
            .map(|stored| stored.metadata.clone())
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, namespace: &str, record: VectorRecord) -> Result<(), IndexError> {
        if record.values.is_empty() {
            return Err(IndexError::InvalidRecord(format!(
                "vector '{}' has no values",
                record.id
            )));
        }

        let mut namespaces = self
            .namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let vectors = namespaces.entry(namespace.to_string()).or_default();
        if let Some(dimension) = vectors.values().next().map(|stored| stored.values.len())
            && dimension != record.values.len()
            && !vectors.contains_key(&record.id)
        {
            return Err(IndexError::InvalidRecord(format!(
                "vector '{}' has dimension {}, namespace expects {dimension}",
                record.id,
                record.values.len()
            )));
        }

        vectors.insert(
            record.id,
            StoredVector {
                values: record.values,
                metadata: record.metadata,
            },
        );
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        query: VectorQuery,
    ) -> Result<Vec<VectorMatch>, IndexError> {
        let namespaces = self
            .namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(vectors) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(&String, f32, &StoredVector)> = vectors
            .iter()
            .filter(|(_, stored)| query.filter.matches(&stored.metadata))
            .map(|(id, stored)| (id, cosine_similarity(&query.vector, &stored.values), stored))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        scored.truncate(query.top_k);

        Ok(scored
            .into_iter()
            .map(|(id, score, stored)| VectorMatch {
                id: id.clone(),
                score,
                metadata: query
                    .include_metadata
                    .then(|| stored.metadata.to_payload()),
            })
            .collect())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
