//! Blob storage on `object_store`: S3 (and S3-compatible providers) or a
//! process-local in-memory store.

use crate::keys::validate_location;
use crate::traits::{BlobReader, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStore, ObjectStoreExt, PutPayload, Result as ObjectResult};
use tokio::io::AsyncReadExt;

#[cfg(feature = "storage-s3")]
use object_store::aws::{AmazonS3, AmazonS3Builder};

/// Storage backed by any `object_store` implementation
#[derive(Debug)]
pub struct ObjectStorage<S> {
    store: S,
    /// Bucket name, or "memory"
    label: String,
    backend: StorageBackend,
}

#[cfg(feature = "storage-s3")]
pub type S3Storage = ObjectStorage<AmazonS3>;

pub type MemoryStorage = ObjectStorage<InMemory>;

#[cfg(feature = "storage-s3")]
impl ObjectStorage<AmazonS3> {
    /// Create S3 storage
    ///
    /// `endpoint_url` selects an S3-compatible provider (e.g. "http://localhost:9000" for MinIO).
    pub fn s3(bucket: String, region: String, endpoint_url: Option<String>) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(ObjectStorage {
            store,
            label: bucket,
            backend: StorageBackend::S3,
        })
    }
}

impl ObjectStorage<InMemory> {
    pub fn in_memory() -> Self {
        ObjectStorage {
            store: InMemory::new(),
            label: "memory".to_string(),
            backend: StorageBackend::Memory,
        }
    }
}

impl<S: ObjectStore> ObjectStorage<S> {
    fn object_path(location: &str) -> StorageResult<Path> {
        validate_location(location)?;
        Ok(Path::from(location.to_string()))
    }
}

#[async_trait]
impl<S: ObjectStore> Storage for ObjectStorage<S> {
    async fn put_stream(
        &self,
        location: &str,
        _content_type: Option<&str>,
        mut reader: BlobReader,
    ) -> StorageResult<u64> {
        let path = Self::object_path(location)?;
        let start = std::time::Instant::now();

        // Single put; object stores publish the object atomically on success.
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to read from stream: {}", e))
        })?;

        let size = buffer.len() as u64;
        let result: ObjectResult<_> = self
            .store
            .put(&path, PutPayload::from(Bytes::from(buffer)))
            .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.label,
                key = %location,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Object store upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.label,
            key = %location,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object store upload successful"
        );

        Ok(size)
    }

    async fn download(&self, location: &str) -> StorageResult<Vec<u8>> {
        let path = Self::object_path(location)?;
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.get(&path).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(location.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.label,
                    key = %location,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object store download failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn delete(&self, location: &str) -> StorageResult<()> {
        let path = Self::object_path(location)?;
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = self.store.delete(&path).await;

        match result {
            Ok(_) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.label,
                    key = %location,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object store delete failed"
                );
                return Err(StorageError::DeleteFailed(e.to_string()));
            }
        }

        tracing::info!(
            bucket = %self.label,
            key = %location,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object store delete successful"
        );

        Ok(())
    }

    async fn exists(&self, location: &str) -> StorageResult<bool> {
        let path = Self::object_path(location)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        self.backend
    }
}
