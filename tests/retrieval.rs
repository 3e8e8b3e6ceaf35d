mod common;

use std::sync::Arc;

use clarify_ingest::{
    embedding::HashEmbeddingClient,
    models::DocumentType,
    processing::{RetrievalError, UploadRequest},
    store::MemoryStore,
    vector::IndexError,
};
use common::{Harness, ingest_settings};

fn harness() -> Harness {
    Harness::new(
        Arc::new(HashEmbeddingClient::new(common::DIMENSION)),
        Arc::new(MemoryStore::new()),
        ingest_settings(40, 10, 2),
    )
}

async fn ingest(harness: &Harness, customer: &str, doc_type: DocumentType, text: &str) -> String {
    harness
        .ingestion
        .ingest(UploadRequest {
            customer_id: customer.into(),
            doc_type,
            filename: "notes.txt".into(),
            bytes: text.as_bytes().to_vec(),
        })
        .await
        .expect("ingestion succeeds")
        .document
        .id
}

#[tokio::test]
async fn customer_without_documents_gets_empty_context() {
    let harness = harness();
    ingest(&harness, "globex", DocumentType::Email, "Globex wants a mobile app.").await;

    let fragments = harness.retriever.retrieve("acme", None).await.unwrap();
    assert!(fragments.is_empty());
    assert_eq!(harness.metrics.snapshot().retrievals, 1);
}

#[tokio::test]
async fn context_never_leaks_other_customers_fragments() {
    let harness = harness();
    // Globex text mirrors the discovery query so it would outrank everything if unfiltered.
    ingest(
        &harness,
        "globex",
        DocumentType::Requirements,
        clarify_ingest::processing::DISCOVERY_QUERY,
    )
    .await;
    let acme_doc = ingest(
        &harness,
        "acme",
        DocumentType::MeetingMinutes,
        "Kickoff: integrate with SAP, single sign-on for staff, weekly reporting, \
         data retention unclear, acceptance criteria pending from product owner.",
    )
    .await;

    let fragments = harness.retriever.retrieve("acme", Some(50)).await.unwrap();

    assert!(!fragments.is_empty());
    assert!(fragments.iter().all(|f| f.customer_id == "acme"));
    assert!(fragments.iter().all(|f| f.document_id == acme_doc));
    assert!(fragments.iter().all(|f| f.doc_type == DocumentType::MeetingMinutes));
    let ranks: Vec<_> = fragments.iter().map(|f| f.rank).collect();
    assert_eq!(ranks, (1..=fragments.len()).collect::<Vec<_>>());
    assert!(fragments.windows(2).all(|pair| pair[0].score >= pair[1].score));
}

#[tokio::test]
async fn top_k_limits_results() {
    let harness = harness();
    let text = "Requirement details repeated for volume. ".repeat(20);
    ingest(&harness, "acme", DocumentType::Requirements, &text).await;

    let default = harness.retriever.retrieve("acme", None).await.unwrap();
    assert_eq!(default.len(), 12);

    let three = harness.retriever.retrieve("acme", Some(3)).await.unwrap();
    assert_eq!(three.len(), 3);
}

#[tokio::test]
async fn index_outage_is_a_retrieval_failure() {
    let harness = harness();
    harness.index.set_down(true);
    assert!(matches!(
        harness.retriever.retrieve("acme", None).await,
        Err(RetrievalError::Index(IndexError::Unavailable(_)))
    ));
}
