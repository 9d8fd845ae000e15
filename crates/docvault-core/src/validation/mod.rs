//! Validation modules

pub mod upload;

pub use upload::{
    derive_storage_location, sanitize_filename, validate_content_hash,
    validate_filename_extension, CONTENT_HASH_LEN,
};
