//! Per-customer upload storage on the local filesystem.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while storing an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Customer id cannot be used as a directory name.
    #[error("invalid customer id '{0}'")]
    InvalidCustomerId(String),
    /// Filename has no usable final component.
    #[error("invalid filename '{0}'")]
    InvalidFilename(String),
    /// Writing the file failed.
    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes uploads to `<root>/<customer_id>/<document_id>_<filename>`.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Store uploads below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write `bytes` for a document and return the path it was written to.
    pub async fn save(
        &self,
        customer_id: &str,
        document_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, UploadError> {
        validate_customer_id(customer_id)?;
        let name = sanitize_filename(filename)?;

        let directory = self.root.join(customer_id);
        tokio::fs::create_dir_all(&directory).await?;
        let path = directory.join(format!("{document_id}_{name}"));
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(
            customer_id,
            document_id,
            path = %path.display(),
            bytes = bytes.len(),
            "Stored upload"
        );
        Ok(path)
    }

    /// Delete a stored upload. A file that is already gone is not an error.
    pub async fn remove(&self, path: &Path) -> Result<(), UploadError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// Accept customer ids that form exactly one ordinary path segment.
pub fn validate_customer_id(customer_id: &str) -> Result<(), UploadError> {
    let valid = !customer_id.trim().is_empty()
        && customer_id != "."
        && customer_id != ".."
        && !customer_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control());
    if valid {
        Ok(())
    } else {
        Err(UploadError::InvalidCustomerId(customer_id.to_string()))
    }
}

/// Reduce an uploaded filename to its final component.
fn sanitize_filename(filename: &str) -> Result<String, UploadError> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .replace('\0', "");
    if name.is_empty() || name == "." || name == ".." {
        return Err(UploadError::InvalidFilename(filename.to_string()));
    }
    Ok(name)
}
