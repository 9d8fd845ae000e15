//! In-process file repository.
//!
//! Used with `DATABASE_URL=memory://` for local runs and by the test suites.
//! Rows live behind one async lock, so each call is atomic like a single-row statement.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use docvault_core::models::{FilePatch, FileRecord, FileStatus};
use docvault_core::AppError;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::file::FileRepository;

#[derive(Clone, Default)]
pub struct InMemoryFileRepository {
    rows: Arc<RwLock<HashMap<Uuid, FileRecord>>>,
}

impl InMemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl FileRepository for InMemoryFileRepository {
    async fn insert(&self, record: &FileRecord) -> Result<FileRecord, AppError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&record.id) {
            return Err(AppError::Conflict(format!(
                "File {} already exists",
                record.id
            )));
        }
        rows.insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn get_for_owner(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<FileRecord>, AppError> {
        Ok(self
            .rows
            .read()
            .await
            .get(&id)
            .filter(|r| r.owner_id == owner_id)
            .cloned())
    }

    async fn update(&self, id: Uuid, patch: &FilePatch) -> Result<FileRecord, AppError> {
        let mut rows = self.rows.write().await;
        let current = rows
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;
        let next = current.apply_patch(patch)?;
        rows.insert(id, next.clone());
        Ok(next)
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let mut rows = self.rows.write().await;
        let owned = rows.get(&id).is_some_and(|r| r.owner_id == owner_id);
        if !owned {
            return Ok(None);
        }
        Ok(rows.remove(&id))
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<FileRecord>, AppError> {
        let rows = self.rows.read().await;
        let mut list: Vec<FileRecord> = rows
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn find_completed_by_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<FileRecord>, AppError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| {
                r.content_hash == content_hash
                    && r.status == FileStatus::Completed
                    && r.storage_location.is_some()
            })
            .min_by_key(|r| r.created_at)
            .cloned())
    }

    async fn find_uploading(
        &self,
        owner_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<FileRecord>, AppError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| {
                r.owner_id == owner_id
                    && r.content_hash == content_hash
                    && r.status == FileStatus::Uploading
            })
            .min_by_key(|r| r.created_at)
            .cloned())
    }

    async fn insert_copy_from(
        &self,
        source_id: Uuid,
        owner_id: Uuid,
        filename: &str,
        status: FileStatus,
    ) -> Result<FileRecord, AppError> {
        let mut rows = self.rows.write().await;
        let source = rows
            .get(&source_id)
            .filter(|r| r.storage_location.is_some())
            .ok_or_else(|| AppError::NotFound(format!("Source file {} not found", source_id)))?;
        let copy = FileRecord::duplicate_of(source, owner_id, filename.to_string(), status);
        rows.insert(copy.id, copy.clone());
        Ok(copy)
    }

    async fn count_by_storage_location(
        &self,
        storage_location: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<i64, AppError> {
        let rows = self.rows.read().await;
        let count = rows
            .values()
            .filter(|r| r.storage_location.as_deref() == Some(storage_location))
            .filter(|r| Some(r.id) != exclude_id)
            .count();
        Ok(count as i64)
    }

    async fn oldest_pending(&self, limit: i64) -> Result<Vec<FileRecord>, AppError> {
        let rows = self.rows.read().await;
        let mut pending: Vec<FileRecord> = rows
            .values()
            .filter(|r| r.status == FileStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
