//! Environment-driven configuration.

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Default chunk window, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 900;
/// Default overlap between consecutive chunk windows, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;
/// Default number of fragments returned by the retriever.
pub const DEFAULT_RETRIEVAL_TOP_K: usize = 12;
/// Default namespace used when `INDEX_NAMESPACE` is unset.
pub const DEFAULT_NAMESPACE: &str = "clarify";

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_DATABASE_PATH: &str = "data/clarify-ingest.db";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the ingestion service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores fragment vectors.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Namespace (Qdrant collection) shared by every customer of this deployment.
    pub index_namespace: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// API key for the OpenAI-compatible embeddings endpoint.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible embeddings endpoint.
    pub openai_base_url: String,
    /// Chunk window length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunk windows.
    pub chunk_overlap: usize,
    /// Default number of fragments returned per retrieval.
    pub retrieval_top_k: usize,
    /// Number of chunk embed/upsert calls kept in flight per document.
    pub ingest_concurrency: usize,
    /// Root directory for uploaded files.
    pub upload_dir: PathBuf,
    /// SQLite database file holding document, text, and chunk records.
    pub database_path: PathBuf,
    /// Maximum accepted upload body size in bytes.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI (or compatible) embeddings API.
    OpenAI,
    /// Deterministic offline hashing embedder.
    Hash,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let chunk_size = vars.parse("CHUNK_SIZE")?.unwrap_or(DEFAULT_CHUNK_SIZE);
        let chunk_overlap = vars.parse("CHUNK_OVERLAP")?.unwrap_or(DEFAULT_CHUNK_OVERLAP);
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidValue(format!(
                "CHUNK_OVERLAP ({chunk_overlap}) must be smaller than CHUNK_SIZE ({chunk_size})"
            )));
        }
        let embedding_dimension = vars
            .parse::<usize>("EMBEDDING_DIMENSION")?
            .ok_or_else(|| ConfigError::MissingVariable("EMBEDDING_DIMENSION".to_string()))?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()));
        }

        Ok(Self {
            qdrant_url: vars.required("QDRANT_URL")?,
            qdrant_api_key: vars.optional("QDRANT_API_KEY"),
            index_namespace: vars.or_default("INDEX_NAMESPACE", DEFAULT_NAMESPACE),
            embedding_provider: vars
                .required("EMBEDDING_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            embedding_model: vars.required("EMBEDDING_MODEL")?,
            embedding_dimension,
            ollama_url: vars.or_default("OLLAMA_URL", DEFAULT_OLLAMA_URL),
            openai_api_key: vars.optional("OPENAI_API_KEY"),
            openai_base_url: vars.or_default("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            chunk_size,
            chunk_overlap,
            retrieval_top_k: vars
                .parse("RETRIEVAL_TOP_K")?
                .unwrap_or(DEFAULT_RETRIEVAL_TOP_K)
                .max(1),
            ingest_concurrency: vars.parse("INGEST_CONCURRENCY")?.unwrap_or(1usize).max(1),
            upload_dir: vars.or_default("UPLOAD_DIR", DEFAULT_UPLOAD_DIR).into(),
            database_path: vars.or_default("DATABASE_PATH", DEFAULT_DATABASE_PATH).into(),
            max_upload_bytes: vars
                .parse("MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            server_port: vars.parse("SERVER_PORT")?,
        })
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.optional(key)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string()))
            })
            .transpose()
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
///
/// Only the binary entry point reads this; library components receive their settings
/// explicitly.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        namespace = %config.index_namespace,
        embedding_provider = ?config.embedding_provider,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
