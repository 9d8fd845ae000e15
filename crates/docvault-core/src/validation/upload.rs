//! Upload input validation and storage location derivation.

use uuid::Uuid;

use crate::error::AppError;

/// Reject filenames whose extension is not `allowed` (case-insensitive, without the dot).
///
/// Disallowed names are rejected rather than renamed.
pub fn validate_filename_extension(filename: &str, allowed: &str) -> Result<(), AppError> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("Filename is required".to_string()));
    }

    let extension = trimmed
        .rsplit_once('.')
        .map(|(stem, ext)| (stem, ext.to_ascii_lowercase()));

    match extension {
        Some((stem, ext)) if !stem.is_empty() && ext == allowed.to_ascii_lowercase() => Ok(()),
        _ => Err(AppError::InvalidInput(format!(
            "Only .{} files are allowed",
            allowed
        ))),
    }
}

/// Length of a hex-encoded SHA-256 digest
pub const CONTENT_HASH_LEN: usize = 64;

/// Content hashes are lowercase hex SHA-256 digests.
pub fn validate_content_hash(hash: &str) -> Result<(), AppError> {
    if hash.is_empty() {
        return Err(AppError::InvalidInput("Content hash is required".to_string()));
    }
    if hash.len() != CONTENT_HASH_LEN {
        return Err(AppError::InvalidInput(format!(
            "Content hash must be {} hex characters, got {}",
            CONTENT_HASH_LEN,
            hash.len()
        )));
    }
    if !hash.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        return Err(AppError::InvalidInput(
            "Content hash must be a lowercase hex digest".to_string(),
        ));
    }
    Ok(())
}

/// Replace everything outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Deterministic blob location for an owner's content: `{owner}/{hash}/{sanitized filename}`.
///
/// The same owner committing the same bytes under the same name lands on the same key.
pub fn derive_storage_location(owner_id: Uuid, content_hash: &str, filename: &str) -> String {
    let mut name = sanitize_filename(filename);
    // ".." would be rejected by the blob store key check
    while name.contains("..") {
        name = name.replace("..", "_.");
    }
    format!("{}/{}/{}", owner_id, content_hash, name)
}
