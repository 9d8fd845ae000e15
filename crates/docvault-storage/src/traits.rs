//! Storage abstraction trait
//!
//! This module defines the Storage trait that all durable blob backends implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed reader accepted by [`Storage::put_stream`].
pub type BlobReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Durable blob store.
///
/// Locations are opaque relative keys (`{owner}/{hash}/{filename}`); they must not
/// contain `..` or start with `/`. Writing to an existing location replaces it, which
/// is harmless because locations are content-addressed.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Consume `reader` until EOF and store it under `location`.
    ///
    /// Returns the number of bytes stored. A failed put leaves no readable blob behind.
    async fn put_stream(
        &self,
        location: &str,
        content_type: Option<&str>,
        reader: BlobReader,
    ) -> StorageResult<u64>;

    /// Store an in-memory payload under `location`.
    async fn put(&self, location: &str, data: Bytes) -> StorageResult<u64> {
        let reader: BlobReader = Box::pin(std::io::Cursor::new(data));
        self.put_stream(location, None, reader).await
    }

    /// Download a blob
    async fn download(&self, location: &str) -> StorageResult<Vec<u8>>;

    /// Delete a blob. Deleting a missing blob succeeds.
    async fn delete(&self, location: &str) -> StorageResult<()>;

    /// Check if a blob exists
    async fn exists(&self, location: &str) -> StorageResult<bool>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
