//! Test helpers: build AppState and router for integration tests.
//!
//! Run from workspace root: `cargo test -p docvault-api`. No external services are
//! needed: the metadata store is in memory, blobs and staging live in a tempdir, and
//! the processing service is a scripted fake.

#![allow(dead_code)]

pub mod client;
pub mod fixtures;
pub mod processing;
pub mod workflows;

use axum_test::TestServer;
use docvault_api::constants;
use docvault_api::setup::routes;
use docvault_api::setup::services::{build_state, Workers};
use docvault_api::state::AppState;
use docvault_core::{BaseConfig, Config, IngestConfig, StorageBackend};
use docvault_db::{FileRepository, InMemoryFileRepository};
use docvault_storage::{ChunkStaging, LocalStorage, Storage};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub use processing::ScriptedProcessing;

/// Shared secret used when a test enables the status callback.
pub const TEST_SERVICE_KEY: &str = "test-service-key";

/// API path prefix for tests (e.g. `/api/v0`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

/// Test application: server, state, and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub processing: Arc<ScriptedProcessing>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub fn repository(&self) -> &Arc<dyn FileRepository> {
        &self.state.repository
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.state.storage
    }

    /// Wait for post-commit background work (staging cleanup) to finish.
    pub async fn settle(&self) {
        self.state.background.flush().await;
    }
}

/// Configuration for a test app rooted in `root`.
pub fn create_test_config(root: &Path) -> IngestConfig {
    IngestConfig {
        base: BaseConfig {
            server_port: 0,
            cors_origins: vec!["*".to_string()],
            db_max_connections: 5,
            db_timeout_seconds: 5,
            environment: "test".to_string(),
            log_format: "compact".to_string(),
        },
        database_url: "memory://".to_string(),
        storage_backend: StorageBackend::Local,
        local_storage_path: root.join("blobs"),
        s3_bucket: None,
        s3_region: None,
        s3_endpoint: None,
        staging_dir: root.join("staging"),
        chunk_size_bytes: 16,
        max_chunk_size_bytes: 64,
        max_total_chunks: 1_000,
        allowed_extension: "md".to_string(),
        verify_content_hash: true,
        dedup_reindex: false,
        processing_service_url: "http://127.0.0.1:9".to_string(),
        processing_timeout_secs: 5,
        ingest_poll_interval_ms: 5_000,
        ingest_batch_size: 1,
        staging_ttl_secs: 0,
        staging_sweep_interval_secs: 3_600,
        service_api_key: None,
    }
}

/// Setup test app with in-memory metadata, local blob storage, and a fake processor.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(|_| {}).await
}

/// Like [`setup_test_app`], with a hook to adjust configuration first.
pub async fn setup_test_app_with(customize: impl FnOnce(&mut IngestConfig)) -> TestApp {
    build_test_app(customize, Workers::Manual).await
}

/// Test app whose ingestion queue loop is running.
pub async fn setup_test_app_with_workers() -> TestApp {
    build_test_app(|_| {}, Workers::Start).await
}

async fn build_test_app(customize: impl FnOnce(&mut IngestConfig), workers: Workers) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let mut ingest_config = create_test_config(temp_dir.path());
    customize(&mut ingest_config);
    let config = Config(Box::new(ingest_config));
    config.validate().expect("Test config must be valid");

    let repository: Arc<dyn FileRepository> = Arc::new(InMemoryFileRepository::new());
    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(config.local_storage_path())
            .await
            .expect("Failed to create local storage"),
    );
    let staging = ChunkStaging::new(config.staging_dir())
        .await
        .expect("Failed to create staging");
    let processing = Arc::new(ScriptedProcessing::accept_all());

    let state = build_state(
        &config,
        repository,
        storage,
        staging,
        processing.clone(),
        workers,
    );

    let app = routes::setup_routes(&config, state.clone()).expect("Failed to build router");
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        state,
        processing,
        _temp_dir: temp_dir,
    }
}
