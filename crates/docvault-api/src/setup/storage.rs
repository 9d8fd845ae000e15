//! Blob storage and chunk staging setup

use anyhow::{Context, Result};
use docvault_core::Config;
use docvault_storage::{create_storage, ChunkStaging, Storage};
use std::sync::Arc;

pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    tracing::info!("Initializing storage abstraction...");
    let storage = create_storage(config)
        .await
        .context("Failed to initialize blob storage")?;
    tracing::info!(
        backend = ?storage.backend_type(),
        "Storage abstraction initialized successfully"
    );
    Ok(storage)
}

pub async fn setup_staging(config: &Config) -> Result<ChunkStaging> {
    let staging = ChunkStaging::new(config.staging_dir().clone())
        .await
        .with_context(|| {
            format!(
                "Failed to create staging directory {}",
                config.staging_dir().display()
            )
        })?;
    tracing::info!(staging_dir = %staging.root().display(), "Chunk staging ready");
    Ok(staging)
}
