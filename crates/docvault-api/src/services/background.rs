//! Post-commit side effects.
//!
//! Work that must not hold up or fail the request that caused it (staging cleanup after
//! a merge, for instance) is spawned here. Failures are logged and dropped.

use std::future::Future;
use std::time::Instant;

use tokio_util::task::TaskTracker;

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            let start = Instant::now();
            match task.await {
                Ok(()) => tracing::debug!(
                    task = name,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Background task finished"
                ),
                Err(e) => tracing::warn!(task = name, error = %e, "Background task failed"),
            }
        });
    }

    /// Tasks spawned and not yet finished
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait for every task spawned so far. New tasks may still be spawned afterwards.
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Wait for outstanding tasks during shutdown.
    pub async fn shutdown(&self) {
        tracing::info!(outstanding = self.len(), "Waiting for background tasks");
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn flush_waits_for_spawned_tasks() {
        let tasks = BackgroundTasks::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            tasks.spawn("count", async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        tasks.flush().await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn failing_task_does_not_poison_others() {
        let tasks = BackgroundTasks::new();
        let counter = Arc::new(AtomicUsize::new(0));

        tasks.spawn("fails", async { Err(anyhow::anyhow!("disk gone")) });
        let c = counter.clone();
        tasks.spawn("succeeds", async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        tasks.flush().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // Still usable after a flush
        let c = counter.clone();
        tasks.spawn("again", async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        tasks.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
