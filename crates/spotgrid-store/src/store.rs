//! The object store seam.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Result type alias for object store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur against the blob store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("store error: {0}")]
    Other(String),
}

/// Upload/list/delete surface of the shared result repository.
///
/// Callers on shutdown or best-effort paths log failures and continue;
/// `file_exists` and `list_files` degrade to `false`/empty rather than
/// failing a run over a listing error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload one file under its base name.
    async fn upload_file(&self, path: &Path) -> StoreResult<()>;

    /// Upload a directory tree under `prefix`, preserving relative
    /// paths.
    async fn upload_directory(&self, dir: &Path, prefix: &str) -> StoreResult<()>;

    /// Delete a stored object by name.
    async fn delete_file(&self, name: &str) -> StoreResult<()>;

    /// Whether an object with this name exists. Errors degrade to
    /// `false`.
    async fn file_exists(&self, name: &str) -> bool;

    /// Names of all stored objects. Errors degrade to empty.
    async fn list_files(&self) -> Vec<String>;
}
