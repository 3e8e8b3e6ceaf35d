//! Customer-scoped retrieval of discovery context.

use crate::{
    embedding::{EmbeddingClient, ensure_dimension},
    metrics::IngestMetrics,
    models::RetrievedFragment,
    processing::types::{RetrievalError, RetrievalSettings},
    vector::{FragmentMetadata, MetadataFilter, VectorIndex, VectorQuery},
};
use std::sync::Arc;

/// Query text describing what questionnaire generation needs from the documents.
pub const DISCOVERY_QUERY: &str = "Extract unclear requirements, missing technical details, constraints, integrations, non-functional requirements, acceptance criteria, data sources, security, roles.";

/// Fetches the fragments most relevant to requirements clarification for one customer.
pub struct Retriever {
    embedding_client: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    settings: RetrievalSettings,
    metrics: Arc<IngestMetrics>,
}

impl Retriever {
    /// Assemble a retriever from injected clients.
    pub fn new(
        embedding_client: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        settings: RetrievalSettings,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            embedding_client,
            index,
            settings,
            metrics,
        }
    }

    /// Return up to `top_k` fragments belonging to `customer_id`, most similar first.
    ///
    /// `None` uses the configured default; zero is treated as one. No matches is an empty
    /// result, not an error.
    pub async fn retrieve(
        &self,
        customer_id: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievedFragment>, RetrievalError> {
        if customer_id.trim().is_empty() {
            return Err(RetrievalError::InvalidCustomer);
        }
        let top_k = top_k.unwrap_or(self.settings.top_k).max(1);

        let vector = self.embedding_client.embed(DISCOVERY_QUERY).await?;
        ensure_dimension(&vector, self.settings.embedding_dimension)?;

        let matches = self
            .index
            .query(
                &self.settings.namespace,
                VectorQuery {
                    vector,
                    top_k,
                    filter: MetadataFilter::for_customer(customer_id),
                    include_metadata: true,
                },
            )
            .await?;
        let returned = matches.len();

        let fragments: Vec<RetrievedFragment> = matches
            .into_iter()
            .filter_map(|hit| {
                let Some(payload) = hit.metadata else {
                    tracing::warn!(vector_id = %hit.id, "Match returned without metadata");
                    return None;
                };
                match FragmentMetadata::from_payload(payload) {
                    Ok(metadata) if metadata.customer_id == customer_id => {
                        Some((metadata, hit.score))
                    }
                    Ok(metadata) => {
                        tracing::warn!(
                            vector_id = %hit.id,
                            owner = %metadata.customer_id,
                            "Dropping match owned by another customer"
                        );
                        None
                    }
                    Err(error) => {
                        tracing::warn!(vector_id = %hit.id, %error, "Dropping match with malformed metadata");
                        None
                    }
                }
            })
            .take(top_k)
            .enumerate()
            .map(|(position, (metadata, score))| {
                RetrievedFragment::from_metadata(metadata, position + 1, score)
            })
            .collect();

        self.metrics.record_retrieval();
        tracing::info!(
            customer_id,
            top_k,
            returned,
            kept = fragments.len(),
            "Retrieved discovery context"
        );
        Ok(fragments)
    }
}
