//! Client upload flow: hash → negotiate → transfer missing chunks → commit.

use crate::api::UploadApi;
use crate::hasher::{compute_content_hash, DEFAULT_HASH_CHUNK_SIZE};
use crate::transfer::{chunk_count, ChunkPlan, ChunkTransferManager, TransferConfig};
use anyhow::{Context, Result};
use docvault_core::models::{CommitRequest, FileStatus, NegotiateRequest};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Stage reported to the caller while an upload runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStage {
    Hashing(u8),
    Uploading(u8),
    Merging,
    /// Committed and queued for ingestion
    Processing,
    Completed,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub file_id: Uuid,
    pub content_hash: String,
    pub duplicate: bool,
    /// Chunks sent by this call
    pub chunks_sent: u32,
    /// Chunks the server already had from an earlier attempt
    pub chunks_resumed: u32,
    /// Status returned by commit. `None` for duplicates, which never commit.
    pub status: Option<FileStatus>,
}

pub struct Uploader {
    api: Arc<dyn UploadApi>,
    transfer: ChunkTransferManager,
    hash_chunk_size: usize,
}

impl Uploader {
    pub fn new(api: Arc<dyn UploadApi>) -> Self {
        Self {
            api,
            transfer: ChunkTransferManager::default(),
            hash_chunk_size: DEFAULT_HASH_CHUNK_SIZE,
        }
    }

    pub fn with_transfer_config(mut self, config: TransferConfig) -> Self {
        self.transfer = ChunkTransferManager::new(config);
        self
    }

    pub fn with_hash_chunk_size(mut self, chunk_size: usize) -> Self {
        self.hash_chunk_size = chunk_size;
        self
    }

    /// Upload one file. On failure `on_stage` receives `UploadStage::Error` before the
    /// error is returned; staged chunks stay on the server so a later call resumes.
    pub async fn upload_file<F>(&self, path: &Path, mut on_stage: F) -> Result<UploadOutcome>
    where
        F: FnMut(UploadStage),
    {
        match self.run(path, &mut on_stage).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                on_stage(UploadStage::Error(format!("{:#}", e)));
                Err(e)
            }
        }
    }

    async fn run<F>(&self, path: &Path, on_stage: &mut F) -> Result<UploadOutcome>
    where
        F: FnMut(UploadStage),
    {
        let start = Instant::now();
        let size_bytes = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        if size_bytes == 0 {
            anyhow::bail!("Refusing to upload empty file {}", path.display());
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("{} has no usable file name", path.display()))?
            .to_string();

        on_stage(UploadStage::Hashing(0));
        let content_hash =
            compute_content_hash(path, self.hash_chunk_size, |p| on_stage(UploadStage::Hashing(p)))
                .await?;

        let negotiated = self
            .api
            .negotiate(&NegotiateRequest {
                content_hash: content_hash.clone(),
                filename: filename.clone(),
                size_bytes: i64::try_from(size_bytes).ok(),
                mime_type: guess_mime_type(&filename).map(String::from),
            })
            .await
            .context("Negotiation failed")?;

        if negotiated.duplicate || !negotiated.needs_upload {
            tracing::info!(
                file_id = %negotiated.session_id,
                content_hash = %content_hash,
                "Content already stored, skipping transfer"
            );
            on_stage(UploadStage::Completed);
            return Ok(UploadOutcome {
                file_id: negotiated.session_id,
                content_hash,
                duplicate: negotiated.duplicate,
                chunks_sent: 0,
                chunks_resumed: 0,
                status: None,
            });
        }

        let total_chunks = chunk_count(size_bytes, negotiated.chunk_size);
        let staged: HashSet<u32> = negotiated
            .already_staged_chunk_indices
            .iter()
            .copied()
            .filter(|i| *i < total_chunks)
            .collect();
        let missing: Vec<u32> = (0..total_chunks).filter(|i| !staged.contains(i)).collect();
        let resumed = total_chunks - missing.len() as u32;

        on_stage(UploadStage::Uploading(percent(resumed, total_chunks)));
        let plan = ChunkPlan {
            session_id: negotiated.session_id,
            content_hash: &content_hash,
            chunk_size: negotiated.chunk_size,
            total_chunks,
            missing: &missing,
        };
        let report = self
            .transfer
            .transfer(self.api.as_ref(), path, &plan, |done, total| {
                on_stage(UploadStage::Uploading(percent(done, total)))
            })
            .await?;

        on_stage(UploadStage::Merging);
        let committed = self
            .api
            .commit(
                negotiated.session_id,
                &CommitRequest {
                    filename,
                    content_hash: content_hash.clone(),
                    total_chunks,
                },
            )
            .await
            .context("Commit failed")?;

        on_stage(UploadStage::Processing);
        tracing::info!(
            file_id = %committed.file_id,
            chunks_sent = report.chunks_sent,
            chunks_resumed = resumed,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload committed"
        );
        on_stage(UploadStage::Completed);

        Ok(UploadOutcome {
            file_id: committed.file_id,
            content_hash,
            duplicate: false,
            chunks_sent: report.chunks_sent,
            chunks_resumed: resumed,
            status: Some(committed.status),
        })
    }
}

fn percent(done: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) as u64 * 100) / total as u64) as u8
}

/// Content type sent at negotiation, from the file extension.
pub fn guess_mime_type(filename: &str) -> Option<&'static str> {
    let extension = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "md" | "markdown" => Some("text/markdown"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}
