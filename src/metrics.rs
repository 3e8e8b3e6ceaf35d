use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and retrieval activity.
#[derive(Default)]
pub struct IngestMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    ingestion_failures: AtomicU64,
    retrievals: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fully indexed document and the number of chunks produced for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record chunks indexed outside a full document ingestion (retries).
    pub fn record_chunks(&self, chunk_count: u64) {
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an ingestion that stopped before every chunk was indexed.
    pub fn record_failure(&self) {
        self.ingestion_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed retrieval call.
    pub fn record_retrieval(&self) {
        self.retrievals.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            ingestion_failures: self.ingestion_failures.load(Ordering::Relaxed),
            retrievals: self.retrievals.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents whose chunks were all indexed since startup.
    pub documents_ingested: u64,
    /// Chunks acknowledged by the vector index since startup.
    pub chunks_indexed: u64,
    /// Ingestions that stopped on an embedding or index failure.
    pub ingestion_failures: u64,
    /// Retrieval calls served since startup.
    pub retrievals: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = IngestMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);
        metrics.record_chunks(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.chunks_indexed, 6);
    }

    #[test]
    fn failures_and_retrievals_are_counted_separately() {
        let metrics = IngestMetrics::new();
        metrics.record_failure();
        metrics.record_retrieval();
        metrics.record_retrieval();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ingestion_failures, 1);
        assert_eq!(snapshot.retrievals, 2);
        assert_eq!(snapshot.documents_ingested, 0);
    }
}
