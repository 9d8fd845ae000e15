use async_trait::async_trait;
use docvault_core::models::{FilePatch, FileRecord, FileStatus};
use docvault_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Metadata store for file records.
///
/// Single-row operations only; every status/progress/location change goes through
/// [`FileRepository::update`], which validates the patch with [`FileRecord::apply_patch`].
#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn insert(&self, record: &FileRecord) -> Result<FileRecord, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError>;

    async fn get_for_owner(&self, owner_id: Uuid, id: Uuid)
        -> Result<Option<FileRecord>, AppError>;

    /// Apply a validated patch. `NotFound` when the row is gone.
    async fn update(&self, id: Uuid, patch: &FilePatch) -> Result<FileRecord, AppError>;

    /// Delete the owner's row, returning it if it existed.
    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<Option<FileRecord>, AppError>;

    /// Newest first.
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<FileRecord>, AppError>;

    /// Any owner's completed record with this digest (dedup source).
    async fn find_completed_by_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<FileRecord>, AppError>;

    /// The owner's in-progress session for this digest, oldest first if several.
    async fn find_uploading(
        &self,
        owner_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<FileRecord>, AppError>;

    /// Insert a new row whose content fields and storage location are copied from `source_id`.
    async fn insert_copy_from(
        &self,
        source_id: Uuid,
        owner_id: Uuid,
        filename: &str,
        status: FileStatus,
    ) -> Result<FileRecord, AppError>;

    /// Rows referencing `storage_location`, optionally ignoring one id.
    async fn count_by_storage_location(
        &self,
        storage_location: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<i64, AppError>;

    /// Oldest `pending` rows, at most `limit`.
    async fn oldest_pending(&self, limit: i64) -> Result<Vec<FileRecord>, AppError>;

    /// Connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), AppError>;
}

const FILE_COLUMNS: &str = "id, owner_id, filename, content_hash, size_bytes, mime_type, \
     storage_location, status, progress, error_message, created_at, updated_at";

/// PostgreSQL-backed file repository
#[derive(Clone)]
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    #[tracing::instrument(skip(self, record), fields(db.table = "files", file_id = %record.id))]
    async fn insert(&self, record: &FileRecord) -> Result<FileRecord, AppError> {
        let row = sqlx::query_as::<Postgres, FileRecord>(&format!(
            r#"
            INSERT INTO files (
                id, owner_id, filename, content_hash, size_bytes, mime_type,
                storage_location, status, progress, error_message, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {FILE_COLUMNS}
            "#
        ))
        .bind(record.id)
        .bind(record.owner_id)
        .bind(&record.filename)
        .bind(&record.content_hash)
        .bind(record.size_bytes)
        .bind(&record.mime_type)
        .bind(&record.storage_location)
        .bind(record.status)
        .bind(record.progress)
        .bind(&record.error_message)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let row = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_for_owner(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<FileRecord>, AppError> {
        let row = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    #[tracing::instrument(skip(self, patch), fields(db.table = "files", db.operation = "update"))]
    async fn update(&self, id: Uuid, patch: &FilePatch) -> Result<FileRecord, AppError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("File {} not found", id)))?;

        let next = current.apply_patch(patch)?;

        let row = sqlx::query_as::<Postgres, FileRecord>(&format!(
            r#"
            UPDATE files
            SET status = $2, progress = $3, storage_location = $4,
                error_message = $5, updated_at = $6
            WHERE id = $1
            RETURNING {FILE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(next.status)
        .bind(next.progress)
        .bind(&next.storage_location)
        .bind(&next.error_message)
        .bind(next.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(row)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "delete"))]
    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let row = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "DELETE FROM files WHERE id = $1 AND owner_id = $2 RETURNING {FILE_COLUMNS}"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<FileRecord>, AppError> {
        let rows = sqlx::query_as::<Postgres, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE owner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_completed_by_hash(
        &self,
        content_hash: &str,
    ) -> Result<Option<FileRecord>, AppError> {
        let row = sqlx::query_as::<Postgres, FileRecord>(&format!(
            r#"
            SELECT {FILE_COLUMNS} FROM files
            WHERE content_hash = $1 AND status = 'completed' AND storage_location IS NOT NULL
            ORDER BY created_at ASC
            LIMIT 1
            "#
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_uploading(
        &self,
        owner_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<FileRecord>, AppError> {
        let row = sqlx::query_as::<Postgres, FileRecord>(&format!(
            r#"
            SELECT {FILE_COLUMNS} FROM files
            WHERE owner_id = $1 AND content_hash = $2 AND status = 'uploading'
            ORDER BY created_at ASC
            LIMIT 1
            "#
        ))
        .bind(owner_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "insert"))]
    async fn insert_copy_from(
        &self,
        source_id: Uuid,
        owner_id: Uuid,
        filename: &str,
        status: FileStatus,
    ) -> Result<FileRecord, AppError> {
        let progress = if status == FileStatus::Completed { 100 } else { 0 };

        let row = sqlx::query_as::<Postgres, FileRecord>(&format!(
            r#"
            INSERT INTO files (
                id, owner_id, filename, content_hash, size_bytes, mime_type,
                storage_location, status, progress
            )
            SELECT $1, $2, $3, content_hash, size_bytes, mime_type, storage_location, $4, $5
            FROM files
            WHERE id = $6 AND storage_location IS NOT NULL
            RETURNING {FILE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(filename)
        .bind(status)
        .bind(progress)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| AppError::NotFound(format!("Source file {} not found", source_id)))
    }

    async fn count_by_storage_location(
        &self,
        storage_location: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM files
            WHERE storage_location = $1 AND ($2::uuid IS NULL OR id <> $2)
            "#,
        )
        .bind(storage_location)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn oldest_pending(&self, limit: i64) -> Result<Vec<FileRecord>, AppError> {
        let rows = sqlx::query_as::<Postgres, FileRecord>(&format!(
            r#"
            SELECT {FILE_COLUMNS} FROM files
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
