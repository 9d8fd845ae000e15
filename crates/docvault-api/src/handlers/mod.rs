pub mod files;
pub mod ingest;
pub mod internal;
pub mod uploads;
