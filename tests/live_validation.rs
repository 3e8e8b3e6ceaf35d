use std::{env, sync::Once};

use clarify_ingest::{
    config,
    embedding::build_embedding_client,
    models::DocumentType,
    qdrant::QdrantIndex,
    vector::{FragmentMetadata, MetadataFilter, VectorIndex, VectorQuery, VectorRecord},
};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() {
    INIT.call_once(|| {
        set_default_env("QDRANT_URL", "http://127.0.0.1:6333");
        set_default_env("INDEX_NAMESPACE", "clarify-live");
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "nomic-embed-text");
        set_default_env("EMBEDDING_DIMENSION", "768");
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
        config::init_config();
    });
}

#[tokio::test]
#[ignore = "Requires live Qdrant"]
async fn live_qdrant_upsert_and_filtered_query() {
    init_config_once();
    let config = config::get_config();
    let index = QdrantIndex::new(&config.qdrant_url, config.qdrant_api_key.clone())
        .expect("qdrant client");
    let namespace = format!("{}-smoke", config.index_namespace);
    index
        .ensure_namespace(&namespace, 4)
        .await
        .expect("namespace should be created");

    let record = VectorRecord {
        id: "live-doc_0".into(),
        values: vec![0.5, 0.5, 0.5, 0.5],
        metadata: FragmentMetadata {
            customer_id: "live-customer".into(),
            document_id: "live-doc".into(),
            chunk_index: 0,
            doc_type: DocumentType::Requirements,
            uploaded_at: "2025-04-02T10:00:00Z".into(),
            text: "The portal must support SAML single sign-on.".into(),
        },
    };
    index.upsert(&namespace, record).await.expect("upsert");

    let matches = index
        .query(
            &namespace,
            VectorQuery {
                vector: vec![0.5, 0.5, 0.5, 0.5],
                top_k: 3,
                filter: MetadataFilter::for_customer("live-customer"),
                include_metadata: true,
            },
        )
        .await
        .expect("query");
    assert!(
        matches.iter().any(|hit| hit.id == "live-doc_0"),
        "upserted vector should be returned: {matches:?}"
    );
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    init_config_once();
    let config = config::get_config();
    let client = build_embedding_client(config).expect("embedding client");
    let vectors = client
        .generate_embeddings(vec!["clarify live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input chunk");
    assert_eq!(
        vectors[0].len(),
        config.embedding_dimension,
        "embedding dimension mismatch"
    );
}
