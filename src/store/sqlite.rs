//! SQLite-backed [`RecordStore`] built on `sqlx`.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{RecordStore, StoreError};
use crate::models::{ChunkRecord, Document, DocumentType, ExtractedText, format_timestamp};

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        customer_id TEXT NOT NULL,
        doc_type TEXT NOT NULL,
        filename TEXT NOT NULL,
        storage_path TEXT NOT NULL,
        uploaded_at TEXT NOT NULL,
        uploaded_at_ns INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_documents_customer ON documents(customer_id, uploaded_at_ns)",
    "CREATE TABLE IF NOT EXISTS extracted_texts (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL UNIQUE REFERENCES documents(id),
        text TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS chunks (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL REFERENCES documents(id),
        chunk_index INTEGER NOT NULL,
        text TEXT NOT NULL,
        vector_id TEXT,
        UNIQUE (document_id, chunk_index)
    )",
];

/// Record store persisted in a SQLite database file.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and ensure the schema exists.
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::info!(path = %path.display(), "Opened record store");
        Self::with_pool(pool).await
    }

    /// Private in-memory database; every call returns an independent store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = in_memory_pool_options().connect_with(options).await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|db| db.is_foreign_key_violation())
}

fn document_from_row(row: &SqliteRow) -> Result<Document, StoreError> {
    let doc_type: String = row.try_get("doc_type")?;
    let uploaded_at: String = row.try_get("uploaded_at")?;
    Ok(Document {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        doc_type: DocumentType::from_str(&doc_type)
            .map_err(|error| StoreError::Corrupt(error.to_string()))?,
        filename: row.try_get("filename")?,
        storage_path: row.try_get("storage_path")?,
        uploaded_at: OffsetDateTime::parse(&uploaded_at, &Rfc3339)
            .map_err(|error| StoreError::Corrupt(format!("uploaded_at '{uploaded_at}': {error}")))?,
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<ChunkRecord, StoreError> {
    let chunk_index: i64 = row.try_get("chunk_index")?;
    Ok(ChunkRecord {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        chunk_index: usize::try_from(chunk_index)
            .map_err(|_| StoreError::Corrupt(format!("negative chunk_index {chunk_index}")))?,
        text: row.try_get("text")?,
        vector_id: row.try_get("vector_id")?,
    })
}

fn index_to_i64(chunk_index: usize) -> Result<i64, StoreError> {
    i64::try_from(chunk_index)
        .map_err(|_| StoreError::Corrupt(format!("chunk_index {chunk_index} out of range")))
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        let uploaded_at_ns = i64::try_from(document.uploaded_at.unix_timestamp_nanos())
            .map_err(|_| StoreError::Corrupt("uploaded_at out of range".to_string()))?;
        sqlx::query(
            "INSERT INTO documents (id, customer_id, doc_type, filename, storage_path, uploaded_at, uploaded_at_ns)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&document.id)
        .bind(&document.customer_id)
        .bind(document.doc_type.as_str())
        .bind(&document.filename)
        .bind(&document.storage_path)
        .bind(format_timestamp(document.uploaded_at))
        .bind(uploaded_at_ns)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                StoreError::DuplicateDocument(document.id.clone())
            } else {
                StoreError::Database(error)
            }
        })?;
        Ok(())
    }

    async fn insert_extracted_text(&self, text: &ExtractedText) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO extracted_texts (id, document_id, text) VALUES (?, ?, ?)")
            .bind(&text.id)
            .bind(&text.document_id)
            .bind(&text.text)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                if is_unique_violation(&error) {
                    StoreError::DuplicateExtractedText(text.document_id.clone())
                } else if is_foreign_key_violation(&error) {
                    StoreError::DocumentNotFound(text.document_id.clone())
                } else {
                    StoreError::Database(error)
                }
            })?;
        Ok(())
    }

    async fn insert_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, text, vector_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(index_to_i64(chunk.chunk_index)?)
        .bind(&chunk.text)
        .bind(chunk.vector_id.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                StoreError::DuplicateChunk {
                    document_id: chunk.document_id.clone(),
                    chunk_index: chunk.chunk_index,
                }
            } else if is_foreign_key_violation(&error) {
                StoreError::DocumentNotFound(chunk.document_id.clone())
            } else {
                StoreError::Database(error)
            }
        })?;
        Ok(())
    }

    async fn mark_chunk_indexed(&self, chunk_id: &str, vector_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE chunks SET vector_id = ? WHERE id = ?")
            .bind(vector_id)
            .bind(chunk_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ChunkNotFound(chunk_id.to_string()));
        }
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            "SELECT id, customer_id, doc_type, filename, storage_path, uploaded_at
             FROM documents WHERE id = ?",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn get_extracted_text(
        &self,
        document_id: &str,
    ) -> Result<Option<ExtractedText>, StoreError> {
        let row = sqlx::query("SELECT id, document_id, text FROM extracted_texts WHERE document_id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| -> Result<ExtractedText, StoreError> {
            Ok(ExtractedText {
                id: row.try_get("id")?,
                document_id: row.try_get("document_id")?,
                text: row.try_get("text")?,
            })
        })
        .transpose()
    }

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, text, vector_id
             FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn list_documents(&self, customer_id: &str) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, customer_id, doc_type, filename, storage_path, uploaded_at
             FROM documents WHERE customer_id = ? ORDER BY uploaded_at_ns DESC, id",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }
}

// Each in-memory connection is a separate database, so the single connection must never be
// recycled.
fn in_memory_pool_options() -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use tempfile::TempDir;
    use time::macros::datetime;

    #[tokio::test]
    async fn round_trips_records() {
        contract::round_trips_records(&SqliteStore::in_memory().await.unwrap()).await;
    }

    #[tokio::test]
    async fn rejects_second_extracted_text() {
        contract::rejects_second_extracted_text(&SqliteStore::in_memory().await.unwrap()).await;
    }

    #[tokio::test]
    async fn lists_chunks_in_sequence_and_marks_indexed() {
        contract::lists_chunks_in_sequence_and_marks_indexed(&SqliteStore::in_memory().await.unwrap())
            .await;
    }

    #[tokio::test]
    async fn lists_customer_documents_newest_first() {
        contract::lists_customer_documents_newest_first(&SqliteStore::in_memory().await.unwrap())
            .await;
    }

    #[test]
    fn in_memory_pool_never_recycles_its_connection() {
        let options = in_memory_pool_options();
        assert_eq!(options.get_max_connections(), 1);
        assert_eq!(options.get_min_connections(), 1);
        assert!(options.get_idle_timeout().is_none());
        assert!(options.get_max_lifetime().is_none());
    }

    #[tokio::test]
    async fn persists_across_connections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("records.db");
        let doc = contract::document("doc-1", "acme", datetime!(2025-03-01 09:30:00.25 UTC));

        {
            let store = SqliteStore::connect(&path).await.unwrap();
            store.insert_document(&doc).await.unwrap();
            store.pool.close().await;
        }

        let reopened = SqliteStore::connect(&path).await.unwrap();
        assert_eq!(reopened.get_document("doc-1").await.unwrap(), Some(doc));
    }

    #[tokio::test]
    async fn duplicate_document_is_reported() {
        let store = SqliteStore::in_memory().await.unwrap();
        let doc = contract::document("doc-1", "acme", datetime!(2025-03-01 09:30:00 UTC));
        store.insert_document(&doc).await.unwrap();
        assert!(matches!(
            store.insert_document(&doc).await,
            Err(StoreError::DuplicateDocument(id)) if id == "doc-1"
        ));
    }
}
