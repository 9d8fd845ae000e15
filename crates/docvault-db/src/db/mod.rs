//! Database repositories for the metadata store
//!
//! `file` holds the `FileRepository` contract and its PostgreSQL implementation;
//! `memory` holds the in-process implementation.

pub mod file;
pub mod memory;

pub use file::{FileRepository, PgFileRepository};
pub use memory::InMemoryFileRepository;
