use anyhow::Context;
use clarify_ingest::{
    api::{self, AppState},
    config, embedding, logging,
    metrics::IngestMetrics,
    processing::{IngestSettings, IngestionService, RetrievalSettings, Retriever},
    qdrant::QdrantIndex,
    store::SqliteStore,
    uploads::UploadStore,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    tracing::info!("Initializing embedding client");
    let embedding_client =
        embedding::build_embedding_client(config).context("Failed to build embedding client")?;

    let index = QdrantIndex::new(&config.qdrant_url, config.qdrant_api_key.clone())
        .context("Failed to configure Qdrant client")?;
    index
        .ensure_namespace(&config.index_namespace, config.embedding_dimension)
        .await
        .context("Failed to prepare Qdrant collection")?;
    let index = Arc::new(index);

    let store = SqliteStore::connect(&config.database_path)
        .await
        .context("Failed to open record store")?;
    let metrics = Arc::new(IngestMetrics::new());

    let ingestion = IngestionService::new(
        embedding_client.clone(),
        index.clone(),
        Arc::new(store),
        UploadStore::new(&config.upload_dir),
        IngestSettings::from_config(config),
        metrics.clone(),
    )
    .context("Invalid chunk settings")?;
    let retriever = Retriever::new(
        embedding_client,
        index,
        RetrievalSettings::from_config(config),
        metrics.clone(),
    );

    let app = api::create_router(
        AppState {
            ingestion: Arc::new(ingestion),
            retriever: Arc::new(retriever),
            metrics,
        },
        config.max_upload_bytes,
    );

    let (listener, port) = bind_listener().await.context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8000..=8099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8000-8099",
    ))
}
