//! Docvault API Library
//!
//! This crate provides the HTTP API handlers, the ingestion service behind them, and
//! application setup.

// Module declarations
mod api_doc;
pub mod constants;
mod handlers;
pub mod services;
pub mod setup;
mod telemetry;

// Public modules
pub mod auth;
pub mod error;
pub mod state;

// Re-exports
pub use error::ErrorResponse;
pub use services::{BackgroundTasks, IngestService, IngestSettings};
pub use state::AppState;
