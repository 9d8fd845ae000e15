//! Service initialization and application state setup

use crate::services::{BackgroundTasks, IngestService, IngestSettings};
use crate::state::AppState;
use anyhow::{Context, Result};
use docvault_core::Config;
use docvault_db::FileRepository;
use docvault_storage::{ChunkStaging, Storage};
use docvault_worker::{
    HttpProcessingService, IngestionQueue, IngestionQueueConfig, ProcessingService,
    StagingReaper,
};
use std::sync::Arc;
use std::time::Duration;

/// Whether to start the queue loop and the staging reaper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workers {
    Start,
    /// Queue ticks only run when driven explicitly; used by tests
    Manual,
}

/// Wire the HTTP processing client and build the application state with workers running.
pub fn initialize_services(
    config: &Config,
    repository: Arc<dyn FileRepository>,
    storage: Arc<dyn Storage>,
    staging: ChunkStaging,
) -> Result<Arc<AppState>> {
    let processing = HttpProcessingService::new(
        config.processing_service_url(),
        Duration::from_secs(config.processing_timeout_secs()),
    )
    .context("Failed to initialize processing service client")?;

    tracing::info!(
        processing_url = config.processing_service_url(),
        timeout_secs = config.processing_timeout_secs(),
        "Processing service client initialized"
    );

    Ok(build_state(
        config,
        repository,
        storage,
        staging,
        Arc::new(processing),
        Workers::Start,
    ))
}

pub fn build_state(
    config: &Config,
    repository: Arc<dyn FileRepository>,
    storage: Arc<dyn Storage>,
    staging: ChunkStaging,
    processing: Arc<dyn ProcessingService>,
    workers: Workers,
) -> Arc<AppState> {
    let queue_config = IngestionQueueConfig {
        poll_interval_ms: config.ingest_poll_interval_ms(),
        batch_size: config.ingest_batch_size(),
        dispatch_timeout_secs: config.processing_timeout_secs(),
    };

    let queue = match workers {
        Workers::Start => IngestionQueue::new(repository.clone(), processing, queue_config),
        Workers::Manual => {
            IngestionQueue::new_no_worker(repository.clone(), processing, queue_config)
        }
    };

    let reaper = if workers == Workers::Start && config.staging_ttl_secs() > 0 {
        let reaper = Arc::new(StagingReaper::new(
            staging.clone(),
            Duration::from_secs(config.staging_ttl_secs()),
            Duration::from_secs(config.staging_sweep_interval_secs()),
        ));
        tracing::info!(
            ttl_secs = config.staging_ttl_secs(),
            sweep_interval_secs = config.staging_sweep_interval_secs(),
            "Staging reaper started"
        );
        Some(reaper.start().abort_handle())
    } else {
        None
    };

    let background = BackgroundTasks::new();
    let ingest = Arc::new(IngestService::new(
        repository.clone(),
        storage.clone(),
        staging.clone(),
        queue.clone(),
        background.clone(),
        IngestSettings::from_config(config),
    ));

    Arc::new(AppState {
        config: config.clone(),
        repository,
        storage,
        staging,
        queue,
        ingest,
        background,
        reaper,
    })
}
