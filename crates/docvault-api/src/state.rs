//! Application state shared by handlers and the shutdown path.

use crate::services::{BackgroundTasks, IngestService};
use docvault_core::Config;
use docvault_db::FileRepository;
use docvault_storage::{ChunkStaging, Storage};
use docvault_worker::IngestionQueue;
use std::sync::Arc;
use tokio::task::AbortHandle;

pub struct AppState {
    pub config: Config,
    pub repository: Arc<dyn FileRepository>,
    pub storage: Arc<dyn Storage>,
    pub staging: ChunkStaging,
    pub queue: IngestionQueue,
    pub ingest: Arc<IngestService>,
    pub background: BackgroundTasks,
    /// Staging reaper loop, when enabled
    pub reaper: Option<AbortHandle>,
}

impl AppState {
    /// Stop the queue loop (waiting for an in-flight dispatch) and the reaper, then wait
    /// for outstanding background tasks.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
        if let Some(ref reaper) = self.reaper {
            reaper.abort();
        }
        self.background.shutdown().await;
    }
}
