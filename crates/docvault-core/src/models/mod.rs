//! Data models for the ingestion pipeline
//!
//! `file` holds the persisted record and its patch type; `upload` holds the
//! request and response shapes shared by the API server and the client.

mod file;
mod upload;

pub use file::*;
pub use upload::*;
