//! Docvault Worker – background ingestion infrastructure.
//!
//! This crate provides the ingestion queue (single-flight polling dispatch of
//! `pending` files), the `ProcessingService` boundary with its HTTP client, and the
//! staging reaper for abandoned upload sessions.

mod processing;
mod queue;
mod reaper;

pub use processing::{HttpProcessingService, ProcessingError, ProcessingService};
pub use queue::{Dispatcher, IngestionQueue, IngestionQueueConfig, TickOutcome};
pub use reaper::StagingReaper;
