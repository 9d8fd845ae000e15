//! Metadata store setup and initialization

use anyhow::{Context, Result};
use docvault_core::Config;
use docvault_db::{FileRepository, InMemoryFileRepository, PgFileRepository};
use sqlx::postgres::PgPoolOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Connect the metadata store and run migrations. `memory://` selects the in-process store.
pub async fn setup_database(config: &Config) -> Result<Arc<dyn FileRepository>> {
    if config.uses_memory_database() {
        tracing::warn!("Using in-memory metadata store; file records are lost on restart");
        return Ok(Arc::new(InMemoryFileRepository::new()));
    }

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds()))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(config.database_url())
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections(),
        "Database connected successfully"
    );

    // Run pending migrations on startup (path: workspace migrations/ from crate root)
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(Arc::new(PgFileRepository::new(pool)))
}
