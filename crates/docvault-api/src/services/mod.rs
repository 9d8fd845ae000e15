pub mod background;
pub mod ingest;

pub use background::BackgroundTasks;
pub use ingest::{IngestService, IngestSettings};
