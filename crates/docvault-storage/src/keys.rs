//! Storage location checks shared by all backends.

use crate::traits::{StorageError, StorageResult};

/// Reject locations that could escape the backend root.
pub fn validate_location(location: &str) -> StorageResult<()> {
    if location.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if location.contains("..") || location.starts_with('/') || location.contains('\\') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_content_addressed_locations() {
        assert!(validate_location("5f0c/abcdef/notes.md").is_ok());
    }

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        assert!(validate_location("").is_err());
        assert!(validate_location("../etc/passwd").is_err());
        assert!(validate_location("a/../../b").is_err());
        assert!(validate_location("/etc/passwd").is_err());
        assert!(validate_location("a\\b").is_err());
    }
}
