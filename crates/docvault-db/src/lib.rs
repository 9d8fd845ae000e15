//! Docvault Database Layer
//!
//! File record repositories for the ingestion pipeline.

pub mod db;

pub use db::{FileRepository, InMemoryFileRepository, PgFileRepository};
