//! Ingestion queue: a single-flight poller that hands `pending` files to the
//! processing service.
//!
//! Each tick (periodic or triggered) claims the oldest pending files, up to
//! `batch_size`, calls the processing service for each, and records `processing` on
//! acceptance or `failed` with the error text otherwise. A tick that arrives while
//! another is still running is skipped, not queued.
//!
//! Shutdown: [`IngestionQueue::shutdown`] stops the loop and waits until a dispatch
//! already in flight has run to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docvault_core::models::{FilePatch, FileRecord};
use docvault_db::FileRepository;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::processing::ProcessingService;

#[derive(Clone, Debug)]
pub struct IngestionQueueConfig {
    pub poll_interval_ms: u64,
    /// Files claimed per tick
    pub batch_size: usize,
    /// Upper bound on one `ingest` call
    pub dispatch_timeout_secs: u64,
}

impl Default for IngestionQueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            batch_size: 1,
            dispatch_timeout_secs: 30,
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick held the in-flight flag
    Skipped,
    /// No pending files
    Idle,
    Ran {
        dispatched: Vec<Uuid>,
        failed: Vec<Uuid>,
    },
    /// The metadata store could not be queried
    Error(String),
}

/// Clears the in-flight flag on drop, including when the tick panics.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Claims and dispatches pending files; owns the in-flight flag.
pub struct Dispatcher {
    repository: Arc<dyn FileRepository>,
    processing: Arc<dyn ProcessingService>,
    config: IngestionQueueConfig,
    in_flight: AtomicBool,
}

impl Dispatcher {
    pub fn new(
        repository: Arc<dyn FileRepository>,
        processing: Arc<dyn ProcessingService>,
        config: IngestionQueueConfig,
    ) -> Self {
        Self {
            repository,
            processing,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one tick. Never returns an error; failures are logged and reported in the outcome.
    pub async fn run_once(&self) -> TickOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("Ingestion tick skipped, dispatch already in flight");
            return TickOutcome::Skipped;
        };

        let limit = self.config.batch_size.max(1) as i64;
        let pending = match self.repository.oldest_pending(limit).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query pending files");
                return TickOutcome::Error(e.to_string());
            }
        };

        if pending.is_empty() {
            tracing::trace!("No pending files");
            return TickOutcome::Idle;
        }

        let mut dispatched = Vec::new();
        let mut failed = Vec::new();
        for file in pending {
            if self.dispatch(&file).await {
                dispatched.push(file.id);
            } else {
                failed.push(file.id);
            }
        }

        TickOutcome::Ran { dispatched, failed }
    }

    /// Returns true when the processing service accepted the file.
    #[tracing::instrument(skip(self, file), fields(file_id = %file.id))]
    async fn dispatch(&self, file: &FileRecord) -> bool {
        let start = std::time::Instant::now();
        let timeout = Duration::from_secs(self.config.dispatch_timeout_secs);

        let error_message =
            match tokio::time::timeout(timeout, self.processing.ingest(file.id)).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!(
                    "Processing service timed out after {}s",
                    timeout.as_secs()
                )),
            };

        match error_message {
            None => {
                if let Err(e) = self
                    .repository
                    .update(file.id, &FilePatch::dispatched())
                    .await
                {
                    // The service may already have reported a later status
                    tracing::warn!(error = %e, "File accepted but status update failed");
                }
                tracing::info!(
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "File handed to processing service"
                );
                true
            }
            Some(message) => {
                tracing::error!(
                    error = %message,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Processing dispatch failed"
                );
                if let Err(e) = self
                    .repository
                    .update(file.id, &FilePatch::failed(message))
                    .await
                {
                    tracing::error!(error = %e, "Failed to record dispatch failure");
                }
                false
            }
        }
    }
}

#[derive(Clone)]
pub struct IngestionQueue {
    dispatcher: Arc<Dispatcher>,
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    /// Running ticks; shutdown waits on these
    ticks: TaskTracker,
    poll_loop: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl IngestionQueue {
    /// Create the queue and spawn its polling loop on the current runtime.
    pub fn new(
        repository: Arc<dyn FileRepository>,
        processing: Arc<dyn ProcessingService>,
        config: IngestionQueueConfig,
    ) -> Self {
        let poll_interval = Duration::from_millis(config.poll_interval_ms.max(1));
        let dispatcher = Arc::new(Dispatcher::new(repository, processing, config));
        let ticks = TaskTracker::new();

        // Capacity 1: triggers arriving while one is queued coalesce
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = tokio::spawn(Self::poll_loop(
            dispatcher.clone(),
            ticks.clone(),
            poll_interval,
            trigger_rx,
            shutdown_rx,
        ));

        Self {
            dispatcher,
            trigger_tx,
            shutdown_tx,
            ticks,
            poll_loop: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Create a queue without a polling loop. Ticks only run through [`Self::run_once`].
    pub fn new_no_worker(
        repository: Arc<dyn FileRepository>,
        processing: Arc<dyn ProcessingService>,
        config: IngestionQueueConfig,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(repository, processing, config));
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        drop(trigger_rx);
        drop(shutdown_rx);
        Self {
            dispatcher,
            trigger_tx,
            shutdown_tx,
            ticks: TaskTracker::new(),
            poll_loop: Arc::new(Mutex::new(None)),
        }
    }

    async fn poll_loop(
        dispatcher: Arc<Dispatcher>,
        ticks: TaskTracker,
        poll_interval: Duration,
        mut trigger_rx: mpsc::Receiver<()>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            poll_interval_ms = poll_interval.as_millis() as u64,
            batch_size = dispatcher.config.batch_size,
            "Ingestion queue started"
        );

        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Ingestion queue shutting down");
                    break;
                }
                Some(()) = trigger_rx.recv() => {
                    Self::spawn_tick(&dispatcher, &ticks);
                }
                _ = ticker.tick() => {
                    Self::spawn_tick(&dispatcher, &ticks);
                }
            }
        }

        tracing::info!("Ingestion queue stopped");
    }

    /// Ticks run on their own task so a slow dispatch never blocks the loop;
    /// the in-flight flag turns overlapping ticks into skips.
    fn spawn_tick(dispatcher: &Arc<Dispatcher>, ticks: &TaskTracker) {
        let dispatcher = dispatcher.clone();
        ticks.spawn(async move {
            dispatcher.run_once().await;
        });
    }

    /// Ask for an immediate pickup. Never blocks; repeated triggers coalesce.
    pub fn trigger(&self) {
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                tracing::debug!("Ingestion queue trigger ignored, loop not running");
            }
        }
    }

    /// Run one tick inline.
    pub async fn run_once(&self) -> TickOutcome {
        self.dispatcher.run_once().await
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Stop the loop, then wait for any tick still dispatching so an accepted file
    /// has its `processing` status recorded before the process exits.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating ingestion queue shutdown");
        let _ = self.shutdown_tx.send(()).await;

        if let Some(handle) = self.poll_loop.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Ingestion queue loop ended abnormally");
            }
        }

        self.ticks.close();
        if !self.ticks.is_empty() {
            tracing::info!(in_flight = self.ticks.len(), "Waiting for in-flight dispatch");
        }
        self.ticks.wait().await;
    }
}
