//! Docvault Storage Library
//!
//! Durable blob storage behind the `Storage` trait (local filesystem, S3, or in-memory
//! via `object_store`) and the per-session chunk staging used by resumable uploads.
//!
//! # Storage location format
//!
//! Blobs are content-addressed: `{owner_id}/{content_hash}/{sanitized_filename}`.
//! Locations must not contain `..` or a leading `/`; every backend checks this through
//! the `keys` module.

pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod object;
pub mod staging;
pub mod traits;

// Re-export commonly used types
pub use docvault_core::StorageBackend;
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use object::S3Storage;
pub use object::{MemoryStorage, ObjectStorage};
pub use staging::{ChunkStaging, MergedFile, SweepReport};
pub use traits::{BlobReader, Storage, StorageError, StorageResult};
