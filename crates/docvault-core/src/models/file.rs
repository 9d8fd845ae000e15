use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a user-visible file.
///
/// `uploading -> pending -> processing -> completed | failed`. The dedup shortcut
/// inserts rows directly at `completed` (or `pending` when re-indexing is enabled).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "file_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Uploading,
    Pending,
    Processing,
    Completed,
    Failed,
}

impl FileStatus {
    /// Terminal states are never left by this pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Failed)
    }

    /// Whether a patch may move a record from `self` to `next`.
    ///
    /// `pending -> failed` covers a dispatch error recorded against the claimed row.
    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        use FileStatus::*;
        matches!(
            (self, next),
            (Uploading, Pending)
                | (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileStatus::Uploading => write!(f, "uploading"),
            FileStatus::Pending => write!(f, "pending"),
            FileStatus::Processing => write!(f, "processing"),
            FileStatus::Completed => write!(f, "completed"),
            FileStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for FileStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(FileStatus::Uploading),
            "pending" => Ok(FileStatus::Pending),
            "processing" => Ok(FileStatus::Processing),
            "completed" => Ok(FileStatus::Completed),
            "failed" => Ok(FileStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid file status: {}", s)),
        }
    }
}

/// One row per user-visible file.
///
/// `storage_location` may be shared by several records when content is deduplicated;
/// it is a back-reference only and the blob is removed when the last record goes away.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FileRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub content_hash: String,
    pub size_bytes: Option<i64>,
    pub mime_type: Option<String>,
    pub storage_location: Option<String>,
    pub status: FileStatus,
    pub progress: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// A fresh upload session row.
    pub fn new_upload(
        owner_id: Uuid,
        filename: String,
        content_hash: String,
        size_bytes: Option<i64>,
        mime_type: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            filename,
            content_hash,
            size_bytes,
            mime_type,
            storage_location: None,
            status: FileStatus::Uploading,
            progress: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A new owner's row pointing at the blob of an already-stored record.
    pub fn duplicate_of(
        source: &FileRecord,
        owner_id: Uuid,
        filename: String,
        status: FileStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            filename,
            content_hash: source.content_hash.clone(),
            size_bytes: source.size_bytes,
            mime_type: source.mime_type.clone(),
            storage_location: source.storage_location.clone(),
            status,
            progress: if status == FileStatus::Completed { 100 } else { 0 },
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a patch, returning the updated record or the reason it was refused.
    ///
    /// Every store implementation goes through this function so the state machine
    /// and the set-once location rule hold regardless of backend.
    pub fn apply_patch(&self, patch: &FilePatch) -> Result<FileRecord, PatchError> {
        if patch.is_empty() {
            return Err(PatchError::Empty);
        }

        let mut next = self.clone();

        if let Some(status) = patch.status {
            // Same-state patches are refused too
            if !self.status.can_transition_to(status) {
                return Err(PatchError::InvalidTransition {
                    from: self.status,
                    to: status,
                });
            }
            next.status = status;
        }

        if let Some(progress) = patch.progress {
            if !(0..=100).contains(&progress) {
                return Err(PatchError::ProgressOutOfRange(progress));
            }
            next.progress = progress;
        }

        if let Some(ref location) = patch.storage_location {
            match self.storage_location {
                Some(ref current) if current != location => {
                    return Err(PatchError::StorageLocationImmutable);
                }
                _ => next.storage_location = Some(location.clone()),
            }
        }

        if let Some(ref message) = patch.error_message {
            if next.status != FileStatus::Failed {
                return Err(PatchError::ErrorMessageRequiresFailed);
            }
            next.error_message = Some(message.clone());
        }

        if next.status == FileStatus::Failed && next.error_message.is_none() {
            return Err(PatchError::MissingErrorMessage);
        }

        if next.status == FileStatus::Pending && next.storage_location.is_none() {
            return Err(PatchError::MissingStorageLocation);
        }

        next.updated_at = Utc::now();
        Ok(next)
    }
}

/// Partial update of a [`FileRecord`]. Every mutable column is listed; `None` leaves it as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilePatch {
    pub status: Option<FileStatus>,
    pub progress: Option<i32>,
    pub storage_location: Option<String>,
    pub error_message: Option<String>,
}

impl FilePatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress.is_none()
            && self.storage_location.is_none()
            && self.error_message.is_none()
    }

    /// Merge & Commit: the blob is stored and the file is ready for pickup.
    pub fn committed(storage_location: String) -> Self {
        Self {
            status: Some(FileStatus::Pending),
            progress: Some(0),
            storage_location: Some(storage_location),
            error_message: None,
        }
    }

    /// The processing service accepted the file.
    pub fn dispatched() -> Self {
        Self {
            status: Some(FileStatus::Processing),
            progress: Some(0),
            ..Self::default()
        }
    }

    pub fn completed() -> Self {
        Self {
            status: Some(FileStatus::Completed),
            progress: Some(100),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(FileStatus::Failed),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("Patch has no fields set")]
    Empty,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: FileStatus, to: FileStatus },

    #[error("Progress {0} is outside 0..=100")]
    ProgressOutOfRange(i32),

    #[error("Storage location is already set and cannot change")]
    StorageLocationImmutable,

    #[error("Error message may only be set on failed files")]
    ErrorMessageRequiresFailed,

    #[error("Failed files require an error message")]
    MissingErrorMessage,

    #[error("Pending files require a storage location")]
    MissingStorageLocation,
}
