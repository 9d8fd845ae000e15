//! Configuration module
//!
//! Server configuration loaded from the environment (and `.env` when present):
//! HTTP, database, blob storage, chunk staging, and the ingestion queue.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::storage_types::StorageBackend;

// Common constants
const SERVER_PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Chunk size advertised to clients (2 MiB).
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 2 * 1024 * 1024;

/// Base configuration for the HTTP process
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    /// `compact` or `json`
    pub log_format: String,
}

/// Ingestion pipeline configuration
#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub base: BaseConfig,
    /// PostgreSQL URL, or `memory://` for the in-process store
    pub database_url: String,
    // Blob storage
    pub storage_backend: StorageBackend,
    pub local_storage_path: PathBuf,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    // Upload sessions
    pub staging_dir: PathBuf,
    pub chunk_size_bytes: u64,
    pub max_chunk_size_bytes: usize,
    pub max_total_chunks: u32,
    pub allowed_extension: String,
    pub verify_content_hash: bool,
    /// Dedup shortcut enters `pending` instead of `completed` so the new owner gets indexed
    pub dedup_reindex: bool,
    // Ingestion queue
    pub processing_service_url: String,
    pub processing_timeout_secs: u64,
    pub ingest_poll_interval_ms: u64,
    pub ingest_batch_size: usize,
    // Staging reaper; ttl 0 = disabled
    pub staging_ttl_secs: u64,
    pub staging_sweep_interval_secs: u64,
    /// Shared secret for the processing status callback; callback disabled when unset
    pub service_api_key: Option<String>,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<IngestConfig>);

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

impl Config {
    fn as_ingest(&self) -> &IngestConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.as_ingest().base.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = IngestConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_ingest().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.as_ingest().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.as_ingest().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.as_ingest().base.environment
    }

    pub fn log_format(&self) -> &str {
        &self.as_ingest().base.log_format
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_ingest().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_ingest().base.db_timeout_seconds
    }

    pub fn database_url(&self) -> &str {
        &self.as_ingest().database_url
    }

    /// Whether the metadata store is the in-process one
    pub fn uses_memory_database(&self) -> bool {
        self.database_url().starts_with("memory://")
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.as_ingest().storage_backend
    }

    pub fn local_storage_path(&self) -> &PathBuf {
        &self.as_ingest().local_storage_path
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.as_ingest().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.as_ingest().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_ingest().s3_endpoint.as_deref()
    }

    pub fn staging_dir(&self) -> &PathBuf {
        &self.as_ingest().staging_dir
    }

    pub fn chunk_size_bytes(&self) -> u64 {
        self.as_ingest().chunk_size_bytes
    }

    pub fn max_chunk_size_bytes(&self) -> usize {
        self.as_ingest().max_chunk_size_bytes
    }

    pub fn max_total_chunks(&self) -> u32 {
        self.as_ingest().max_total_chunks
    }

    pub fn allowed_extension(&self) -> &str {
        &self.as_ingest().allowed_extension
    }

    pub fn verify_content_hash(&self) -> bool {
        self.as_ingest().verify_content_hash
    }

    pub fn dedup_reindex(&self) -> bool {
        self.as_ingest().dedup_reindex
    }

    pub fn processing_service_url(&self) -> &str {
        &self.as_ingest().processing_service_url
    }

    pub fn processing_timeout_secs(&self) -> u64 {
        self.as_ingest().processing_timeout_secs
    }

    pub fn ingest_poll_interval_ms(&self) -> u64 {
        self.as_ingest().ingest_poll_interval_ms
    }

    pub fn ingest_batch_size(&self) -> usize {
        self.as_ingest().ingest_batch_size
    }

    pub fn staging_ttl_secs(&self) -> u64 {
        self.as_ingest().staging_ttl_secs
    }

    pub fn staging_sweep_interval_secs(&self) -> u64 {
        self.as_ingest().staging_sweep_interval_secs
    }

    pub fn service_api_key(&self) -> Option<&str> {
        self.as_ingest().service_api_key.as_deref()
    }
}

impl IngestConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        const MAX_CHUNK_SIZE_BYTES: usize = 8 * 1024 * 1024;
        const MAX_TOTAL_CHUNKS: u32 = 10_000;
        const PROCESSING_TIMEOUT_SECS: u64 = 30;
        const INGEST_POLL_INTERVAL_MS: u64 = 5000;
        const INGEST_BATCH_SIZE: usize = 1;
        const STAGING_TTL_SECS: u64 = 24 * 3600;
        const STAGING_SWEEP_INTERVAL_SECS: u64 = 3600;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins: Vec<String> = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_parse("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            environment,
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "compact".to_string())
                .to_lowercase(),
        };

        let storage_backend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .parse::<StorageBackend>()?;

        let config = IngestConfig {
            base,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            storage_backend,
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|_| "./data/blobs".to_string())
                .into(),
            s3_bucket: env::var("S3_BUCKET").ok().filter(|s| !s.is_empty()),
            s3_region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .ok()
                .filter(|s| !s.is_empty()),
            s3_endpoint: env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()),
            staging_dir: env::var("STAGING_DIR")
                .unwrap_or_else(|_| "./data/staging".to_string())
                .into(),
            chunk_size_bytes: env_parse("CHUNK_SIZE_BYTES", DEFAULT_CHUNK_SIZE_BYTES),
            max_chunk_size_bytes: env_parse("MAX_CHUNK_SIZE_BYTES", MAX_CHUNK_SIZE_BYTES),
            max_total_chunks: env_parse("MAX_TOTAL_CHUNKS", MAX_TOTAL_CHUNKS),
            allowed_extension: env::var("ALLOWED_EXTENSION")
                .unwrap_or_else(|_| "md".to_string())
                .trim()
                .trim_start_matches('.')
                .to_lowercase(),
            verify_content_hash: env_bool("VERIFY_CONTENT_HASH", true),
            dedup_reindex: env_bool("DEDUP_REINDEX", false),
            processing_service_url: env::var("PROCESSING_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            processing_timeout_secs: env_parse("PROCESSING_TIMEOUT_SECS", PROCESSING_TIMEOUT_SECS),
            ingest_poll_interval_ms: env_parse("INGEST_POLL_INTERVAL_MS", INGEST_POLL_INTERVAL_MS),
            ingest_batch_size: env_parse("INGEST_BATCH_SIZE", INGEST_BATCH_SIZE),
            staging_ttl_secs: env_parse("STAGING_TTL_SECS", STAGING_TTL_SECS),
            staging_sweep_interval_secs: env_parse(
                "STAGING_SWEEP_INTERVAL_SECS",
                STAGING_SWEEP_INTERVAL_SECS,
            ),
            service_api_key: env::var("SERVICE_API_KEY").ok().filter(|s| !s.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let environment = self.base.environment.to_lowercase();
        let is_production = environment == "production" || environment == "prod";
        if is_production && self.base.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let url = self.database_url.as_str();
        if !(url.starts_with("postgres://")
            || url.starts_with("postgresql://")
            || url.starts_with("memory://"))
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a PostgreSQL connection string or memory://"
            ));
        }

        if self.base.db_max_connections == 0 {
            return Err(anyhow::anyhow!("DB_MAX_CONNECTIONS cannot be 0"));
        }

        if self.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("CHUNK_SIZE_BYTES must be greater than 0"));
        }

        if (self.chunk_size_bytes as usize) > self.max_chunk_size_bytes {
            return Err(anyhow::anyhow!(
                "CHUNK_SIZE_BYTES ({}) cannot exceed MAX_CHUNK_SIZE_BYTES ({})",
                self.chunk_size_bytes,
                self.max_chunk_size_bytes
            ));
        }

        if self.allowed_extension.is_empty() {
            return Err(anyhow::anyhow!("ALLOWED_EXTENSION cannot be empty"));
        }

        if self.ingest_poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("INGEST_POLL_INTERVAL_MS must be greater than 0"));
        }

        if self.ingest_batch_size == 0 {
            return Err(anyhow::anyhow!("INGEST_BATCH_SIZE must be at least 1"));
        }

        if self.staging_ttl_secs > 0 && self.staging_sweep_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "STAGING_SWEEP_INTERVAL_SECS must be greater than 0 when STAGING_TTL_SECS is set"
            ));
        }

        if self.storage_backend == StorageBackend::S3 && self.s3_bucket.is_none() {
            return Err(anyhow::anyhow!(
                "S3_BUCKET must be set when using S3 storage backend"
            ));
        }

        if self.storage_backend == StorageBackend::S3 && self.s3_region.is_none() {
            return Err(anyhow::anyhow!(
                "S3_REGION or AWS_REGION must be set when using S3 storage backend"
            ));
        }

        Ok(())
    }
}
