//! Upload session negotiation, chunk receipt, merge & commit, and owner file operations.
//!
//! The service owns the server side of the resumable upload protocol:
//! negotiate (dedup / resume / new) → chunk transfer into staging → commit (verify, merge,
//! store, `uploading → pending`) → queue trigger.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use docvault_core::models::{
    ChunkUploadParams, ChunkUploadResponse, CommitRequest, CommitResponse, FilePatch, FileRecord,
    FileResponse, FileStatus, NegotiateRequest, NegotiateResponse, ProcessingStatusReport,
};
use docvault_core::validation::{
    derive_storage_location, validate_content_hash, validate_filename_extension,
};
use docvault_core::{AppError, Config};
use docvault_db::FileRepository;
use docvault_storage::{BlobReader, ChunkStaging, Storage};
use docvault_worker::IngestionQueue;
use uuid::Uuid;
use validator::Validate;

use super::background::BackgroundTasks;
use crate::error::storage_error_to_app;

/// Upload policy knobs taken from [`Config`]
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub chunk_size_bytes: u64,
    pub max_chunk_size_bytes: usize,
    pub max_total_chunks: u32,
    pub allowed_extension: String,
    pub verify_content_hash: bool,
    pub dedup_reindex: bool,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size_bytes: config.chunk_size_bytes(),
            max_chunk_size_bytes: config.max_chunk_size_bytes(),
            max_total_chunks: config.max_total_chunks(),
            allowed_extension: config.allowed_extension().to_string(),
            verify_content_hash: config.verify_content_hash(),
            dedup_reindex: config.dedup_reindex(),
        }
    }
}

pub struct IngestService {
    repository: Arc<dyn FileRepository>,
    storage: Arc<dyn Storage>,
    staging: ChunkStaging,
    queue: IngestionQueue,
    background: BackgroundTasks,
    settings: IngestSettings,
}

impl IngestService {
    pub fn new(
        repository: Arc<dyn FileRepository>,
        storage: Arc<dyn Storage>,
        staging: ChunkStaging,
        queue: IngestionQueue,
        background: BackgroundTasks,
        settings: IngestSettings,
    ) -> Self {
        Self {
            repository,
            storage,
            staging,
            queue,
            background,
            settings,
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Decide between the dedup shortcut, resuming the owner's session, or a new session.
    #[tracing::instrument(
        skip(self, request),
        fields(owner_id = %owner_id, content_hash = %request.content_hash, operation = "negotiate")
    )]
    pub async fn negotiate(
        &self,
        owner_id: Uuid,
        request: NegotiateRequest,
    ) -> Result<NegotiateResponse, AppError> {
        request.validate()?;
        validate_content_hash(&request.content_hash)?;
        validate_filename_extension(&request.filename, &self.settings.allowed_extension)?;

        if let Some(source) = self
            .repository
            .find_completed_by_hash(&request.content_hash)
            .await?
        {
            let status = if self.settings.dedup_reindex {
                FileStatus::Pending
            } else {
                FileStatus::Completed
            };
            let record = self
                .repository
                .insert_copy_from(source.id, owner_id, request.filename.trim(), status)
                .await?;

            if status == FileStatus::Pending {
                self.queue.trigger();
            }

            tracing::info!(
                file_id = %record.id,
                source_id = %source.id,
                status = %record.status,
                "Duplicate content, upload skipped"
            );

            return Ok(NegotiateResponse {
                duplicate: true,
                needs_upload: false,
                session_id: record.id,
                already_staged_chunk_indices: Vec::new(),
                chunk_size: self.settings.chunk_size_bytes,
            });
        }

        if let Some(session) = self
            .repository
            .find_uploading(owner_id, &request.content_hash)
            .await?
        {
            let staged = self
                .staging
                .list_chunks(session.id)
                .await
                .map_err(storage_error_to_app)?;

            tracing::info!(
                session_id = %session.id,
                staged_chunks = staged.len(),
                "Resuming upload session"
            );

            return Ok(NegotiateResponse {
                duplicate: false,
                needs_upload: true,
                session_id: session.id,
                already_staged_chunk_indices: staged,
                chunk_size: self.settings.chunk_size_bytes,
            });
        }

        let record = FileRecord::new_upload(
            owner_id,
            request.filename.trim().to_string(),
            request.content_hash,
            request.size_bytes,
            request.mime_type,
        );
        let record = self.repository.insert(&record).await?;

        tracing::info!(session_id = %record.id, "Upload session created");

        Ok(NegotiateResponse {
            duplicate: false,
            needs_upload: true,
            session_id: record.id,
            already_staged_chunk_indices: Vec::new(),
            chunk_size: self.settings.chunk_size_bytes,
        })
    }

    /// The owner's session, which must still be `uploading` and carry `content_hash`.
    async fn open_session(
        &self,
        owner_id: Uuid,
        session_id: Uuid,
        content_hash: &str,
    ) -> Result<FileRecord, AppError> {
        let session = self
            .repository
            .get_for_owner(owner_id, session_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Upload session not found".to_string()))?;

        if session.status != FileStatus::Uploading {
            return Err(AppError::Conflict(format!(
                "Upload session is {}, not uploading",
                session.status
            )));
        }
        if session.content_hash != content_hash {
            return Err(AppError::Conflict(
                "Content hash does not match the upload session".to_string(),
            ));
        }
        Ok(session)
    }

    fn check_total_chunks(&self, total_chunks: u32) -> Result<(), AppError> {
        if total_chunks == 0 {
            return Err(AppError::InvalidInput(
                "total_chunks must be at least 1".to_string(),
            ));
        }
        if total_chunks > self.settings.max_total_chunks {
            return Err(AppError::InvalidInput(format!(
                "total_chunks {} exceeds maximum {}",
                total_chunks, self.settings.max_total_chunks
            )));
        }
        Ok(())
    }

    /// Stage one chunk. Re-sending an index replaces the earlier copy.
    #[tracing::instrument(
        skip(self, params, data),
        fields(owner_id = %owner_id, session_id = %session_id, chunk_index, size_bytes = data.len())
    )]
    pub async fn receive_chunk(
        &self,
        owner_id: Uuid,
        session_id: Uuid,
        chunk_index: u32,
        params: ChunkUploadParams,
        data: Bytes,
    ) -> Result<ChunkUploadResponse, AppError> {
        self.check_total_chunks(params.total_chunks)?;
        if chunk_index >= params.total_chunks {
            return Err(AppError::InvalidInput(format!(
                "chunk_index {} is out of range for {} chunks",
                chunk_index, params.total_chunks
            )));
        }
        if data.is_empty() {
            return Err(AppError::InvalidInput("Chunk body is empty".to_string()));
        }
        if data.len() > self.settings.max_chunk_size_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Chunk of {} bytes exceeds maximum {} bytes",
                data.len(),
                self.settings.max_chunk_size_bytes
            )));
        }

        self.open_session(owner_id, session_id, &params.content_hash)
            .await?;

        let size_bytes = self
            .staging
            .write_chunk(session_id, chunk_index, &data)
            .await
            .map_err(storage_error_to_app)?;

        Ok(ChunkUploadResponse {
            session_id,
            chunk_index,
            size_bytes,
        })
    }

    /// Merge staged chunks, store the blob, and move the record to `pending`.
    ///
    /// Any failure before the record update leaves it `uploading` with its chunks staged,
    /// so the commit can be retried without re-sending data.
    #[tracing::instrument(
        skip(self, request),
        fields(owner_id = %owner_id, session_id = %session_id, total_chunks = request.total_chunks)
    )]
    pub async fn commit(
        &self,
        owner_id: Uuid,
        session_id: Uuid,
        request: CommitRequest,
    ) -> Result<CommitResponse, AppError> {
        request.validate()?;
        self.check_total_chunks(request.total_chunks)?;
        validate_filename_extension(&request.filename, &self.settings.allowed_extension)?;

        let session = self
            .open_session(owner_id, session_id, &request.content_hash)
            .await?;

        let staged = self
            .staging
            .list_chunks(session_id)
            .await
            .map_err(storage_error_to_app)?;
        if staged.len() != request.total_chunks as usize {
            return Err(AppError::Integrity(format!(
                "Chunk count mismatch: expected {}, found {}",
                request.total_chunks,
                staged.len()
            )));
        }
        if staged
            .iter()
            .zip(0..request.total_chunks)
            .any(|(staged, expected)| *staged != expected)
        {
            return Err(AppError::Integrity(format!(
                "Staged chunk indices do not cover 0..{}",
                request.total_chunks
            )));
        }

        let start = Instant::now();
        let merged = self
            .staging
            .merge_into_scratch(
                session_id,
                request.total_chunks,
                self.settings.verify_content_hash,
            )
            .await
            .map_err(storage_error_to_app)?;

        if let Some(ref digest) = merged.sha256 {
            if *digest != session.content_hash {
                if let Err(e) = self.staging.remove_scratch(session_id).await {
                    tracing::warn!(error = %e, "Failed to remove scratch file after hash mismatch");
                }
                return Err(AppError::Integrity(format!(
                    "Content hash mismatch: session expects {}, merged chunks hash to {}",
                    session.content_hash, digest
                )));
            }
        }

        let location =
            derive_storage_location(owner_id, &session.content_hash, &request.filename);

        let scratch = tokio::fs::File::open(&merged.path).await?;
        let reader: BlobReader = Box::pin(scratch);
        if let Err(e) = self
            .storage
            .put_stream(&location, session.mime_type.as_deref(), reader)
            .await
        {
            // Staging and scratch stay for a retry
            tracing::error!(error = %e, storage_location = %location, "Blob store rejected merged file");
            return Err(storage_error_to_app(e));
        }

        let record = self
            .repository
            .update(session_id, &FilePatch::committed(location.clone()))
            .await?;

        let staging = self.staging.clone();
        self.background.spawn("staging_cleanup", async move {
            staging.remove_session(session_id).await?;
            Ok(())
        });
        self.queue.trigger();

        tracing::info!(
            file_id = %record.id,
            storage_location = %location,
            size_bytes = merged.size_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload committed"
        );

        Ok(CommitResponse {
            file_id: record.id,
            status: record.status,
            storage_location: location,
        })
    }

    #[tracing::instrument(skip(self), fields(owner_id = %owner_id))]
    pub async fn list(&self, owner_id: Uuid) -> Result<Vec<FileResponse>, AppError> {
        let records = self.repository.list_by_owner(owner_id).await?;
        Ok(records.into_iter().map(FileResponse::from).collect())
    }

    pub async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<FileResponse, AppError> {
        self.repository
            .get_for_owner(owner_id, id)
            .await?
            .map(FileResponse::from)
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }

    /// Delete the owner's record. The blob goes only with the last record referencing it.
    #[tracing::instrument(skip(self), fields(owner_id = %owner_id, file_id = %id))]
    pub async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let record = self
            .repository
            .delete(owner_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

        // Counted after the row is gone so a commit that wrote the same location in the
        // meantime is seen. A commit landing between this count and the blob delete can
        // still lose its blob.
        if let Some(ref location) = record.storage_location {
            match self
                .repository
                .count_by_storage_location(location, None)
                .await
            {
                Ok(0) => {
                    if let Err(e) = self.storage.delete(location).await {
                        tracing::warn!(
                            error = %e,
                            storage_location = %location,
                            "Failed to delete blob of last reference"
                        );
                    }
                }
                Ok(references) => {
                    tracing::debug!(
                        storage_location = %location,
                        references,
                        "Blob still referenced, kept"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        storage_location = %location,
                        "Could not count blob references, blob kept"
                    );
                }
            }
        }

        if record.status == FileStatus::Uploading {
            let staging = self.staging.clone();
            self.background.spawn("staging_cleanup", async move {
                staging.remove_session(id).await?;
                Ok(())
            });
        }

        tracing::info!(status = %record.status, "File deleted");
        Ok(())
    }

    /// Apply a status report from the processing service.
    ///
    /// A `completed` report for a file still marked `pending` (the report overtook the
    /// dispatcher's own update) first records the `processing` step.
    #[tracing::instrument(skip(self, report), fields(file_id = %id, status = %report.status))]
    pub async fn report_status(
        &self,
        id: Uuid,
        report: ProcessingStatusReport,
    ) -> Result<FileResponse, AppError> {
        let target = report.status;
        if !matches!(
            target,
            FileStatus::Processing | FileStatus::Completed | FileStatus::Failed
        ) {
            return Err(AppError::InvalidInput(format!(
                "Processing service cannot report status {}",
                target
            )));
        }
        if target == FileStatus::Failed && report.error_message.is_none() {
            return Err(AppError::InvalidInput(
                "A failed status needs an error_message".to_string(),
            ));
        }

        let record = self
            .repository
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

        if record.status == FileStatus::Pending && target == FileStatus::Completed {
            self.repository.update(id, &FilePatch::dispatched()).await?;
        }

        let patch = FilePatch {
            status: Some(target),
            progress: report
                .progress
                .or((target == FileStatus::Completed).then_some(100)),
            storage_location: None,
            error_message: report.error_message,
        };
        let updated = self.repository.update(id, &patch).await?;

        Ok(updated.into())
    }

    /// Ask the ingestion queue for an immediate pickup.
    pub fn trigger(&self) {
        self.queue.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docvault_db::InMemoryFileRepository;
    use docvault_storage::{MemoryStorage, StorageError, StorageResult};
    use docvault_worker::{IngestionQueueConfig, ProcessingError, ProcessingService};
    use sha2::{Digest, Sha256};
    use tempfile::TempDir;

    struct AcceptAll;

    #[async_trait]
    impl ProcessingService for AcceptAll {
        async fn ingest(&self, _file_id: Uuid) -> Result<(), ProcessingError> {
            Ok(())
        }
    }

    /// Blob store that is down
    struct Unavailable;

    #[async_trait]
    impl Storage for Unavailable {
        async fn put_stream(
            &self,
            _location: &str,
            _content_type: Option<&str>,
            _reader: BlobReader,
        ) -> StorageResult<u64> {
            Err(StorageError::BackendError("connection refused".to_string()))
        }

        async fn download(&self, location: &str) -> StorageResult<Vec<u8>> {
            Err(StorageError::NotFound(location.to_string()))
        }

        async fn delete(&self, _location: &str) -> StorageResult<()> {
            Ok(())
        }

        async fn exists(&self, _location: &str) -> StorageResult<bool> {
            Ok(false)
        }

        fn backend_type(&self) -> docvault_core::StorageBackend {
            docvault_core::StorageBackend::Memory
        }
    }

    struct Fixture {
        service: IngestService,
        repository: Arc<InMemoryFileRepository>,
        storage: Arc<dyn Storage>,
        staging: ChunkStaging,
        queue: IngestionQueue,
        background: BackgroundTasks,
        _dir: TempDir,
    }

    fn settings() -> IngestSettings {
        IngestSettings {
            chunk_size_bytes: 4,
            max_chunk_size_bytes: 16,
            max_total_chunks: 100,
            allowed_extension: "md".to_string(),
            verify_content_hash: true,
            dedup_reindex: false,
        }
    }

    async fn fixture_with(storage: Arc<dyn Storage>, settings: IngestSettings) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let staging = ChunkStaging::new(dir.path().join("staging")).await.unwrap();
        let repository = Arc::new(InMemoryFileRepository::new());
        let queue = IngestionQueue::new_no_worker(
            repository.clone(),
            Arc::new(AcceptAll),
            IngestionQueueConfig::default(),
        );
        let background = BackgroundTasks::new();
        let service = IngestService::new(
            repository.clone(),
            storage.clone(),
            staging.clone(),
            queue.clone(),
            background.clone(),
            settings,
        );
        Fixture {
            service,
            repository,
            storage,
            staging,
            queue,
            background,
            _dir: dir,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryStorage::in_memory()), settings()).await
    }

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    fn negotiate_request(data: &[u8], filename: &str) -> NegotiateRequest {
        NegotiateRequest {
            content_hash: sha256_hex(data),
            filename: filename.to_string(),
            size_bytes: Some(data.len() as i64),
            mime_type: Some("text/markdown".to_string()),
        }
    }

    fn chunk_params(total_chunks: u32, data: &[u8]) -> ChunkUploadParams {
        ChunkUploadParams {
            total_chunks,
            content_hash: sha256_hex(data),
        }
    }

    fn commit_request(data: &[u8], filename: &str, total_chunks: u32) -> CommitRequest {
        CommitRequest {
            filename: filename.to_string(),
            content_hash: sha256_hex(data),
            total_chunks,
        }
    }

    /// Negotiate, send every chunk of `data` in 4-byte pieces, commit.
    async fn upload(fx: &Fixture, owner: Uuid, data: &[u8], filename: &str) -> CommitResponse {
        let negotiated = fx
            .service
            .negotiate(owner, negotiate_request(data, filename))
            .await
            .unwrap();
        let chunks: Vec<&[u8]> = data.chunks(4).collect();
        let total = chunks.len() as u32;
        for (index, chunk) in chunks.into_iter().enumerate() {
            fx.service
                .receive_chunk(
                    owner,
                    negotiated.session_id,
                    index as u32,
                    chunk_params(total, data),
                    Bytes::copy_from_slice(chunk),
                )
                .await
                .unwrap();
        }
        fx.service
            .commit(owner, negotiated.session_id, commit_request(data, filename, total))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn new_session_then_commit_reaches_pending() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"# Notes\nhello world";

        let committed = upload(&fx, owner, data, "notes.md").await;
        assert_eq!(committed.status, FileStatus::Pending);
        assert_eq!(
            committed.storage_location,
            format!("{}/{}/notes.md", owner, sha256_hex(data))
        );
        assert_eq!(
            fx.storage.download(&committed.storage_location).await.unwrap(),
            data.to_vec()
        );

        fx.background.flush().await;
        assert!(fx.staging.list_chunks(committed.file_id).await.unwrap().is_empty());
        assert!(!fx.staging.scratch_path(committed.file_id).exists());
    }

    #[tokio::test]
    async fn disallowed_extension_is_rejected_and_not_persisted() {
        let fx = fixture().await;
        let err = fx
            .service
            .negotiate(Uuid::new_v4(), negotiate_request(b"data", "notes.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(fx.repository.is_empty().await);
    }

    #[tokio::test]
    async fn negotiation_resumes_with_staged_indices() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"0123456789ab";

        let first = fx
            .service
            .negotiate(owner, negotiate_request(data, "a.md"))
            .await
            .unwrap();
        fx.service
            .receive_chunk(owner, first.session_id, 2, chunk_params(3, data), Bytes::from_static(b"89ab"))
            .await
            .unwrap();
        fx.service
            .receive_chunk(owner, first.session_id, 0, chunk_params(3, data), Bytes::from_static(b"0123"))
            .await
            .unwrap();

        let resumed = fx
            .service
            .negotiate(owner, negotiate_request(data, "a.md"))
            .await
            .unwrap();
        assert!(!resumed.duplicate);
        assert!(resumed.needs_upload);
        assert_eq!(resumed.session_id, first.session_id);
        assert_eq!(resumed.already_staged_chunk_indices, vec![0, 2]);
    }

    #[tokio::test]
    async fn other_owner_gets_completed_duplicate_without_upload() {
        let fx = fixture().await;
        let owner_a = Uuid::new_v4();
        let owner_b = Uuid::new_v4();
        let data = b"shared content";

        let committed = upload(&fx, owner_a, data, "a.md").await;
        fx.repository
            .update(committed.file_id, &FilePatch::dispatched())
            .await
            .unwrap();
        fx.repository
            .update(committed.file_id, &FilePatch::completed())
            .await
            .unwrap();

        let negotiated = fx
            .service
            .negotiate(owner_b, negotiate_request(data, "b.md"))
            .await
            .unwrap();
        assert!(negotiated.duplicate);
        assert!(!negotiated.needs_upload);

        let record = fx.service.get(owner_b, negotiated.session_id).await.unwrap();
        assert_eq!(record.status, FileStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.filename, "b.md");
        assert!(fx
            .staging
            .list_chunks(negotiated.session_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn reindex_option_enters_duplicates_as_pending() {
        let mut s = settings();
        s.dedup_reindex = true;
        let fx = fixture_with(Arc::new(MemoryStorage::in_memory()), s).await;
        let data = b"indexed twice";

        let committed = upload(&fx, Uuid::new_v4(), data, "a.md").await;
        fx.repository
            .update(committed.file_id, &FilePatch::dispatched())
            .await
            .unwrap();
        fx.repository
            .update(committed.file_id, &FilePatch::completed())
            .await
            .unwrap();

        let owner_b = Uuid::new_v4();
        let negotiated = fx
            .service
            .negotiate(owner_b, negotiate_request(data, "b.md"))
            .await
            .unwrap();
        assert!(negotiated.duplicate);
        let record = fx.service.get(owner_b, negotiated.session_id).await.unwrap();
        assert_eq!(record.status, FileStatus::Pending);
    }

    #[tokio::test]
    async fn chunk_cross_checks() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"abcdefgh";
        let session = fx
            .service
            .negotiate(owner, negotiate_request(data, "a.md"))
            .await
            .unwrap()
            .session_id;

        let out_of_range = fx
            .service
            .receive_chunk(owner, session, 2, chunk_params(2, data), Bytes::from_static(b"abcd"))
            .await
            .unwrap_err();
        assert!(matches!(out_of_range, AppError::InvalidInput(_)));

        let empty = fx
            .service
            .receive_chunk(owner, session, 0, chunk_params(2, data), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(empty, AppError::InvalidInput(_)));

        let wrong_hash = fx
            .service
            .receive_chunk(owner, session, 0, chunk_params(2, b"other"), Bytes::from_static(b"abcd"))
            .await
            .unwrap_err();
        assert!(matches!(wrong_hash, AppError::Conflict(_)));

        let other_owner = fx
            .service
            .receive_chunk(Uuid::new_v4(), session, 0, chunk_params(2, data), Bytes::from_static(b"abcd"))
            .await
            .unwrap_err();
        assert!(matches!(other_owner, AppError::NotFound(_)));

        let too_large = fx
            .service
            .receive_chunk(owner, session, 0, chunk_params(2, data), Bytes::from(vec![0u8; 17]))
            .await
            .unwrap_err();
        assert!(matches!(too_large, AppError::PayloadTooLarge(_)));

        assert!(fx.staging.list_chunks(session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_rejects_count_mismatch_and_keeps_session() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"0123456789ab";
        let session = fx
            .service
            .negotiate(owner, negotiate_request(data, "a.md"))
            .await
            .unwrap()
            .session_id;
        for (index, chunk) in [&b"0123"[..], &b"4567"[..]].into_iter().enumerate() {
            fx.service
                .receive_chunk(owner, session, index as u32, chunk_params(3, data), Bytes::copy_from_slice(chunk))
                .await
                .unwrap();
        }

        let fewer = fx
            .service
            .commit(owner, session, commit_request(data, "a.md", 3))
            .await
            .unwrap_err();
        assert!(matches!(fewer, AppError::Integrity(ref m) if m.contains("expected 3, found 2")));

        let more = fx
            .service
            .commit(owner, session, commit_request(data, "a.md", 1))
            .await
            .unwrap_err();
        assert!(matches!(more, AppError::Integrity(_)));

        let record = fx.repository.get(session).await.unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Uploading);
        assert!(record.storage_location.is_none());
        assert_eq!(fx.staging.list_chunks(session).await.unwrap(), vec![0, 1]);

        // Sending the last chunk makes the retry succeed
        fx.service
            .receive_chunk(owner, session, 2, chunk_params(3, data), Bytes::from_static(b"89ab"))
            .await
            .unwrap();
        let committed = fx
            .service
            .commit(owner, session, commit_request(data, "a.md", 3))
            .await
            .unwrap();
        assert_eq!(committed.status, FileStatus::Pending);
    }

    #[tokio::test]
    async fn commit_rejects_content_that_does_not_match_hash() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"expected";
        let session = fx
            .service
            .negotiate(owner, negotiate_request(data, "a.md"))
            .await
            .unwrap()
            .session_id;
        fx.service
            .receive_chunk(owner, session, 0, chunk_params(1, data), Bytes::from_static(b"tampered"))
            .await
            .unwrap();

        let err = fx
            .service
            .commit(owner, session, commit_request(data, "a.md", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Integrity(ref m) if m.contains("hash mismatch")));
        assert!(!fx.staging.scratch_path(session).exists());
        assert_eq!(fx.staging.list_chunks(session).await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn blob_store_failure_leaves_session_retryable() {
        let fx = fixture_with(Arc::new(Unavailable), settings()).await;
        let owner = Uuid::new_v4();
        let data = b"abcd";
        let session = fx
            .service
            .negotiate(owner, negotiate_request(data, "a.md"))
            .await
            .unwrap()
            .session_id;
        fx.service
            .receive_chunk(owner, session, 0, chunk_params(1, data), Bytes::from_static(b"abcd"))
            .await
            .unwrap();

        let err = fx
            .service
            .commit(owner, session, commit_request(data, "a.md", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        let record = fx.repository.get(session).await.unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Uploading);
        assert_eq!(fx.staging.list_chunks(session).await.unwrap(), vec![0]);
        assert!(fx.staging.scratch_path(session).exists());
    }

    #[tokio::test]
    async fn delete_keeps_shared_blob_until_last_reference() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"same bytes";

        let first = upload(&fx, owner, data, "a.md").await;
        let second = upload(&fx, owner, data, "a.md").await;
        assert_ne!(first.file_id, second.file_id);
        assert_eq!(first.storage_location, second.storage_location);

        fx.service.delete(owner, first.file_id).await.unwrap();
        assert!(fx.storage.exists(&second.storage_location).await.unwrap());

        fx.service.delete(owner, second.file_id).await.unwrap();
        assert!(!fx.storage.exists(&second.storage_location).await.unwrap());

        let err = fx.service.delete(owner, second.file_id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    /// Lands another session's commit on the same blob while a row is being deleted.
    struct CommitDuringDelete {
        inner: Arc<InMemoryFileRepository>,
        landing: std::sync::Mutex<Option<(Uuid, String)>>,
    }

    #[async_trait]
    impl FileRepository for CommitDuringDelete {
        async fn insert(&self, record: &FileRecord) -> Result<FileRecord, AppError> {
            self.inner.insert(record).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
            self.inner.get(id).await
        }

        async fn get_for_owner(
            &self,
            owner_id: Uuid,
            id: Uuid,
        ) -> Result<Option<FileRecord>, AppError> {
            self.inner.get_for_owner(owner_id, id).await
        }

        async fn update(&self, id: Uuid, patch: &FilePatch) -> Result<FileRecord, AppError> {
            self.inner.update(id, patch).await
        }

        async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<Option<FileRecord>, AppError> {
            let landing = self.landing.lock().unwrap().take();
            if let Some((session_id, location)) = landing {
                self.inner
                    .update(session_id, &FilePatch::committed(location))
                    .await?;
            }
            self.inner.delete(owner_id, id).await
        }

        async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<FileRecord>, AppError> {
            self.inner.list_by_owner(owner_id).await
        }

        async fn find_completed_by_hash(
            &self,
            content_hash: &str,
        ) -> Result<Option<FileRecord>, AppError> {
            self.inner.find_completed_by_hash(content_hash).await
        }

        async fn find_uploading(
            &self,
            owner_id: Uuid,
            content_hash: &str,
        ) -> Result<Option<FileRecord>, AppError> {
            self.inner.find_uploading(owner_id, content_hash).await
        }

        async fn insert_copy_from(
            &self,
            source_id: Uuid,
            owner_id: Uuid,
            filename: &str,
            status: FileStatus,
        ) -> Result<FileRecord, AppError> {
            self.inner
                .insert_copy_from(source_id, owner_id, filename, status)
                .await
        }

        async fn count_by_storage_location(
            &self,
            storage_location: &str,
            exclude_id: Option<Uuid>,
        ) -> Result<i64, AppError> {
            self.inner
                .count_by_storage_location(storage_location, exclude_id)
                .await
        }

        async fn oldest_pending(&self, limit: i64) -> Result<Vec<FileRecord>, AppError> {
            self.inner.oldest_pending(limit).await
        }

        async fn ping(&self) -> Result<(), AppError> {
            self.inner.ping().await
        }
    }

    #[tokio::test]
    async fn delete_sees_commit_that_lands_on_the_same_blob() {
        let fx = fixture().await;
        let owner = Uuid::new_v4();
        let data = b"same bytes";

        let first = upload(&fx, owner, data, "a.md").await;
        // First is pending, not completed: the same owner gets a fresh session
        let second = fx
            .service
            .negotiate(owner, negotiate_request(data, "a.md"))
            .await
            .unwrap();
        assert!(second.needs_upload);
        assert_ne!(second.session_id, first.file_id);

        let repository = Arc::new(CommitDuringDelete {
            inner: fx.repository.clone(),
            landing: std::sync::Mutex::new(Some((
                second.session_id,
                first.storage_location.clone(),
            ))),
        });
        let service = IngestService::new(
            repository,
            fx.storage.clone(),
            fx.staging.clone(),
            fx.queue.clone(),
            fx.background.clone(),
            settings(),
        );

        service.delete(owner, first.file_id).await.unwrap();

        assert!(fx.storage.exists(&first.storage_location).await.unwrap());
        let survivor = fx.repository.get(second.session_id).await.unwrap().unwrap();
        assert_eq!(
            survivor.storage_location.as_deref(),
            Some(first.storage_location.as_str())
        );
    }

    #[tokio::test]
    async fn status_report_walks_the_state_machine() {
        let fx = fixture().await;
        let committed = upload(&fx, Uuid::new_v4(), b"report me", "a.md").await;

        let done = fx
            .service
            .report_status(
                committed.file_id,
                ProcessingStatusReport {
                    status: FileStatus::Completed,
                    progress: None,
                    error_message: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, FileStatus::Completed);
        assert_eq!(done.progress, 100);

        let err = fx
            .service
            .report_status(
                committed.file_id,
                ProcessingStatusReport {
                    status: FileStatus::Processing,
                    progress: Some(10),
                    error_message: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidPatch(_)));
    }

    #[tokio::test]
    async fn commit_triggers_queue_pickup() {
        let fx = fixture().await;
        let committed = upload(&fx, Uuid::new_v4(), b"queue me", "a.md").await;

        let outcome = fx.queue.run_once().await;
        assert_eq!(
            outcome,
            docvault_worker::TickOutcome::Ran {
                dispatched: vec![committed.file_id],
                failed: vec![],
            }
        );
        let record = fx.repository.get(committed.file_id).await.unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Processing);
    }
}
