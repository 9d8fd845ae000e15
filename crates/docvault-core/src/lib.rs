//! Docvault Core Library
//!
//! Domain models, error types, configuration, and validation shared by the
//! server crates and the upload client.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{BaseConfig, Config, IngestConfig, DEFAULT_CHUNK_SIZE_BYTES};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
