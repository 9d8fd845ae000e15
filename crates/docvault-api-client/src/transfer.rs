//! Chunk Transfer Manager.
//!
//! Sends the chunks a session is missing in batches of at most `concurrency`
//! transfers. A batch must fully settle before the next starts, so no more than
//! `concurrency` chunks are ever in flight. Each chunk is retried up to
//! `max_retries` extra times with linear backoff before the transfer fails.

use crate::api::UploadApi;
use anyhow::{Context, Result};
use bytes::Bytes;
use docvault_core::models::ChunkUploadParams;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Simultaneous chunk transfers per batch
    pub concurrency: usize,
    /// Extra attempts per chunk after the first failure
    pub max_retries: u32,
    /// Delay before retry `n` is `retry_backoff * n`
    pub retry_backoff: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl TransferConfig {
    /// Defaults overridden by DOCVAULT_UPLOAD_CONCURRENCY and DOCVAULT_CHUNK_RETRIES.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let concurrency = std::env::var("DOCVAULT_UPLOAD_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.concurrency);
        let max_retries = std::env::var("DOCVAULT_CHUNK_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults.max_retries);

        Self {
            concurrency,
            max_retries,
            ..defaults
        }
    }
}

/// Number of chunks a file of `size_bytes` splits into.
pub fn chunk_count(size_bytes: u64, chunk_size: u64) -> u32 {
    if chunk_size == 0 {
        return 0;
    }
    size_bytes.div_ceil(chunk_size) as u32
}

/// What a completed transfer did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub chunks_sent: u32,
    pub retries: u32,
}

/// One session's transfer parameters.
#[derive(Debug, Clone)]
pub struct ChunkPlan<'a> {
    pub session_id: Uuid,
    pub content_hash: &'a str,
    pub chunk_size: u64,
    pub total_chunks: u32,
    pub missing: &'a [u32],
}

#[derive(Debug, Clone, Default)]
pub struct ChunkTransferManager {
    config: TransferConfig,
}

impl ChunkTransferManager {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Transfer every chunk in `plan.missing`, reading each from `path` at its offset.
    ///
    /// `on_progress(confirmed, total)` counts chunks already staged before this call
    /// as confirmed and is called once per chunk the server acknowledges.
    pub async fn transfer<F>(
        &self,
        api: &dyn UploadApi,
        path: &Path,
        plan: &ChunkPlan<'_>,
        mut on_progress: F,
    ) -> Result<TransferReport>
    where
        F: FnMut(u32, u32),
    {
        if plan.chunk_size == 0 {
            anyhow::bail!("Chunk size must be positive");
        }

        let missing: BTreeSet<u32> = plan.missing.iter().copied().collect();
        if let Some(index) = missing.iter().find(|i| **i >= plan.total_chunks) {
            anyhow::bail!(
                "Chunk index {} is outside 0..{}",
                index,
                plan.total_chunks
            );
        }
        let missing: Vec<u32> = missing.into_iter().collect();

        let params = ChunkUploadParams {
            total_chunks: plan.total_chunks,
            content_hash: plan.content_hash.to_string(),
        };
        let mut confirmed = plan.total_chunks - missing.len() as u32;
        let mut report = TransferReport::default();

        for batch in missing.chunks(self.config.concurrency.max(1)) {
            let results = join_all(batch.iter().map(|index| {
                self.send_with_retry(api, path, plan, &params, *index)
            }))
            .await;

            let mut first_error = None;
            for result in results {
                match result {
                    Ok(retries) => {
                        confirmed += 1;
                        report.chunks_sent += 1;
                        report.retries += retries;
                        on_progress(confirmed, plan.total_chunks);
                    }
                    Err(e) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        tracing::debug!(
            session_id = %plan.session_id,
            chunks_sent = report.chunks_sent,
            retries = report.retries,
            "Chunk transfer finished"
        );

        Ok(report)
    }

    /// Returns the number of retries the chunk needed.
    async fn send_with_retry(
        &self,
        api: &dyn UploadApi,
        path: &Path,
        plan: &ChunkPlan<'_>,
        params: &ChunkUploadParams,
        index: u32,
    ) -> Result<u32> {
        let body = read_chunk(path, index, plan.chunk_size).await?;
        let mut attempt = 0u32;

        loop {
            match api
                .put_chunk(plan.session_id, index, params, body.clone())
                .await
            {
                Ok(_) => return Ok(attempt),
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        session_id = %plan.session_id,
                        chunk_index = index,
                        attempt,
                        error = %e,
                        "Chunk transfer failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "Chunk {} failed after {} attempt(s)",
                        index,
                        attempt + 1
                    )))
                }
            }
        }
    }
}

/// Read chunk `index` of `path`; the last chunk may be short.
pub async fn read_chunk(path: &Path, index: u32, chunk_size: u64) -> Result<Bytes> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.seek(std::io::SeekFrom::Start(index as u64 * chunk_size))
        .await
        .with_context(|| format!("Failed to seek to chunk {}", index))?;

    let mut buffer = Vec::with_capacity(chunk_size as usize);
    file.take(chunk_size)
        .read_to_end(&mut buffer)
        .await
        .with_context(|| format!("Failed to read chunk {}", index))?;

    if buffer.is_empty() {
        anyhow::bail!("Chunk {} is past the end of {}", index, path.display());
    }
    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docvault_core::models::{
        ChunkUploadResponse, CommitRequest, CommitResponse, NegotiateRequest, NegotiateResponse,
    };
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records chunk bodies; fails configured indices a fixed number of times.
    #[derive(Default)]
    struct RecordingApi {
        received: Mutex<BTreeMap<u32, Vec<u8>>>,
        failures_left: Mutex<HashMap<u32, u32>>,
        attempts: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RecordingApi {
        fn failing(index: u32, times: u32) -> Self {
            let api = Self::default();
            api.failures_left.lock().unwrap().insert(index, times);
            api
        }
    }

    #[async_trait]
    impl UploadApi for RecordingApi {
        async fn negotiate(&self, _request: &NegotiateRequest) -> Result<NegotiateResponse> {
            unreachable!()
        }

        async fn put_chunk(
            &self,
            session_id: Uuid,
            chunk_index: u32,
            _params: &ChunkUploadParams,
            body: Bytes,
        ) -> Result<ChunkUploadResponse> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            {
                let mut failures = self.failures_left.lock().unwrap();
                if let Some(left) = failures.get_mut(&chunk_index) {
                    if *left > 0 {
                        *left -= 1;
                        anyhow::bail!("connection reset");
                    }
                }
            }

            self.received
                .lock()
                .unwrap()
                .insert(chunk_index, body.to_vec());
            Ok(ChunkUploadResponse {
                session_id,
                chunk_index,
                size_bytes: body.len() as u64,
            })
        }

        async fn commit(&self, _session_id: Uuid, _request: &CommitRequest) -> Result<CommitResponse> {
            unreachable!()
        }
    }

    fn fast_config(max_retries: u32) -> TransferConfig {
        TransferConfig {
            concurrency: 3,
            max_retries,
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn sample_file(dir: &tempfile::TempDir, len: usize) -> (std::path::PathBuf, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, &data).unwrap();
        (path, data)
    }

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(5 * 1024 * 1024, 2 * 1024 * 1024), 3);
        assert_eq!(chunk_count(4, 2), 2);
        assert_eq!(chunk_count(1, 2), 1);
        assert_eq!(chunk_count(0, 2), 0);
    }

    #[tokio::test]
    async fn sends_every_missing_chunk_once_with_bounded_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let (path, data) = sample_file(&dir, 100);
        let api = RecordingApi::default();
        let manager = ChunkTransferManager::new(fast_config(0));
        let missing: Vec<u32> = (0..10).collect();
        let plan = ChunkPlan {
            session_id: Uuid::new_v4(),
            content_hash: "abc",
            chunk_size: 10,
            total_chunks: 10,
            missing: &missing,
        };

        let mut progress = Vec::new();
        let report = manager
            .transfer(&api, &path, &plan, |done, total| progress.push((done, total)))
            .await
            .unwrap();

        assert_eq!(report.chunks_sent, 10);
        assert_eq!(api.attempts.load(Ordering::SeqCst), 10);
        assert!(api.max_in_flight.load(Ordering::SeqCst) <= 3);
        let received = api.received.lock().unwrap();
        let joined: Vec<u8> = received.values().flatten().copied().collect();
        assert_eq!(joined, data);
        assert_eq!(progress.last(), Some(&(10, 10)));
    }

    #[tokio::test]
    async fn progress_counts_already_staged_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = sample_file(&dir, 25);
        let api = RecordingApi::default();
        let manager = ChunkTransferManager::new(fast_config(0));
        let plan = ChunkPlan {
            session_id: Uuid::new_v4(),
            content_hash: "abc",
            chunk_size: 10,
            total_chunks: 3,
            missing: &[1],
        };

        let mut progress = Vec::new();
        manager
            .transfer(&api, &path, &plan, |done, total| progress.push((done, total)))
            .await
            .unwrap();

        assert_eq!(progress, vec![(3, 3)]);
        let received = api.received.lock().unwrap();
        assert_eq!(received.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(received[&1], (10..20u8).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn last_chunk_may_be_short() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = sample_file(&dir, 25);

        let last = read_chunk(&path, 2, 10).await.unwrap();
        assert_eq!(last.len(), 5);
        assert!(read_chunk(&path, 3, 10).await.is_err());
    }

    #[tokio::test]
    async fn failed_chunk_is_retried_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = sample_file(&dir, 30);
        let api = RecordingApi::failing(1, 1);
        let manager = ChunkTransferManager::new(fast_config(2));
        let missing = [0, 1, 2];
        let plan = ChunkPlan {
            session_id: Uuid::new_v4(),
            content_hash: "abc",
            chunk_size: 10,
            total_chunks: 3,
            missing: &missing,
        };

        let report = manager.transfer(&api, &path, &plan, |_, _| {}).await.unwrap();

        assert_eq!(report.chunks_sent, 3);
        assert_eq!(report.retries, 1);
        assert_eq!(api.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(api.received.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = sample_file(&dir, 30);
        let api = RecordingApi::failing(2, 5);
        let manager = ChunkTransferManager::new(fast_config(1));
        let missing = [0, 1, 2];
        let plan = ChunkPlan {
            session_id: Uuid::new_v4(),
            content_hash: "abc",
            chunk_size: 10,
            total_chunks: 3,
            missing: &missing,
        };

        let err = manager
            .transfer(&api, &path, &plan, |_, _| {})
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("Chunk 2 failed after 2 attempt(s)"));
        // the rest of the batch still landed and stays staged for a resume
        assert_eq!(api.received.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejects_indices_outside_total() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = sample_file(&dir, 30);
        let api = RecordingApi::default();
        let plan = ChunkPlan {
            session_id: Uuid::new_v4(),
            content_hash: "abc",
            chunk_size: 10,
            total_chunks: 3,
            missing: &[3],
        };

        let result = ChunkTransferManager::default()
            .transfer(&api, &path, &plan, |_, _| {})
            .await;

        assert!(result.is_err());
        assert_eq!(api.attempts.load(Ordering::SeqCst), 0);
    }
}
