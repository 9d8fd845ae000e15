use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::file::{FileRecord, FileStatus};

/// Request to negotiate an upload session for a file identified by its content hash
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NegotiateRequest {
    /// SHA-256 hex digest of the whole file, computed client-side
    #[validate(length(
        equal = 64,
        message = "Content hash must be a 64-character SHA-256 hex digest"
    ))]
    pub content_hash: String,
    /// Original filename
    #[validate(length(
        min = 1,
        max = 255,
        message = "Filename must be between 1 and 255 characters"
    ))]
    pub filename: String,
    /// File size in bytes
    #[serde(default)]
    pub size_bytes: Option<i64>,
    /// Content type (MIME type)
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Outcome of negotiation: full dedup, resumable session, or new session
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct NegotiateResponse {
    /// A completed file with the same content already exists; no bytes need to move
    pub duplicate: bool,
    /// Whether the client must send chunks and commit
    pub needs_upload: bool,
    /// Session id while uploading; the new file id for duplicates
    pub session_id: Uuid,
    /// Chunk indices already staged server-side, ascending
    pub already_staged_chunk_indices: Vec<u32>,
    /// Chunk size the server expects
    pub chunk_size: u64,
}

/// Query parameters accompanying a raw chunk body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChunkUploadParams {
    /// Total number of chunks in the file
    pub total_chunks: u32,
    /// Content hash of the whole file, cross-checked against the session
    pub content_hash: String,
}

/// Acknowledgement of a staged chunk
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChunkUploadResponse {
    pub session_id: Uuid,
    pub chunk_index: u32,
    pub size_bytes: u64,
}

/// Request to merge staged chunks and commit the file
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CommitRequest {
    /// Original filename
    #[validate(length(
        min = 1,
        max = 255,
        message = "Filename must be between 1 and 255 characters"
    ))]
    pub filename: String,
    /// Content hash of the whole file
    #[validate(length(
        equal = 64,
        message = "Content hash must be a 64-character SHA-256 hex digest"
    ))]
    pub content_hash: String,
    /// Declared number of chunks
    #[validate(range(min = 1, message = "A commit needs at least one chunk"))]
    pub total_chunks: u32,
}

/// Response after a successful commit
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommitResponse {
    pub file_id: Uuid,
    pub status: FileStatus,
    pub storage_location: String,
}

/// Status report sent back by the processing service
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProcessingStatusReport {
    pub status: FileStatus,
    #[serde(default)]
    pub progress: Option<i32>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// File as exposed to its owner
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct FileResponse {
    pub id: Uuid,
    pub filename: String,
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub status: FileStatus,
    pub progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<FileRecord> for FileResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename,
            content_hash: record.content_hash,
            size_bytes: record.size_bytes,
            mime_type: record.mime_type,
            status: record.status,
            progress: record.progress,
            error_message: record.error_message,
            created_at: record.created_at,
        }
    }
}
