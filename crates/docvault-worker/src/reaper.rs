use std::sync::Arc;
use std::time::Duration;

use docvault_storage::{ChunkStaging, StorageResult, SweepReport};
use tokio::time::interval;

/// Periodically removes staging left behind by abandoned upload sessions.
///
/// File records of reaped sessions stay `uploading`; a later negotiation reports no
/// staged chunks and the client sends everything again.
#[derive(Clone)]
pub struct StagingReaper {
    staging: ChunkStaging,
    ttl: Duration,
    sweep_interval: Duration,
}

impl StagingReaper {
    pub fn new(staging: ChunkStaging, ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            staging,
            ttl,
            sweep_interval,
        }
    }

    /// Start the sweep loop. Abort the returned handle to stop it.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut sweep_interval = interval(self.sweep_interval);
            sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                sweep_interval.tick().await;

                match self.sweep_once().await {
                    Ok(report) => {
                        if report != SweepReport::default() {
                            tracing::info!(
                                sessions_removed = report.sessions_removed,
                                scratch_files_removed = report.scratch_files_removed,
                                "Staging sweep completed"
                            );
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Staging sweep failed"),
                }
            }
        })
    }

    #[tracing::instrument(skip(self), fields(ttl_secs = self.ttl.as_secs()))]
    pub async fn sweep_once(&self) -> StorageResult<SweepReport> {
        self.staging.sweep_older_than(self.ttl).await
    }
}
