//! `UploadApi` adapters so the client `Uploader` can drive the in-process service.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use docvault_api::IngestService;
use docvault_api_client::UploadApi;
use docvault_core::models::{
    ChunkUploadParams, ChunkUploadResponse, CommitRequest, CommitResponse, NegotiateRequest,
    NegotiateResponse,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use uuid::Uuid;

/// Calls `IngestService` directly as one owner.
pub struct InProcessApi {
    service: Arc<IngestService>,
    owner_id: Uuid,
}

impl InProcessApi {
    pub fn new(service: Arc<IngestService>, owner_id: Uuid) -> Self {
        Self { service, owner_id }
    }
}

#[async_trait]
impl UploadApi for InProcessApi {
    async fn negotiate(&self, request: &NegotiateRequest) -> Result<NegotiateResponse> {
        Ok(self
            .service
            .negotiate(self.owner_id, request.clone())
            .await?)
    }

    async fn put_chunk(
        &self,
        session_id: Uuid,
        chunk_index: u32,
        params: &ChunkUploadParams,
        body: Bytes,
    ) -> Result<ChunkUploadResponse> {
        Ok(self
            .service
            .receive_chunk(self.owner_id, session_id, chunk_index, params.clone(), body)
            .await?)
    }

    async fn commit(&self, session_id: Uuid, request: &CommitRequest) -> Result<CommitResponse> {
        Ok(self
            .service
            .commit(self.owner_id, session_id, request.clone())
            .await?)
    }
}

/// Wraps another `UploadApi`, failing chosen chunk indices a set number of times and
/// counting every chunk that reaches the inner API.
pub struct FlakyApi {
    inner: Arc<dyn UploadApi>,
    failures_left: Mutex<HashMap<u32, u32>>,
    /// Once set, every chunk call fails, simulating a dropped connection
    offline_after: Option<usize>,
    delivered: Mutex<Vec<u32>>,
}

impl FlakyApi {
    pub fn new(inner: Arc<dyn UploadApi>) -> Self {
        Self {
            inner,
            failures_left: Mutex::new(HashMap::new()),
            offline_after: None,
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_chunk(self, index: u32, times: u32) -> Self {
        self.failures_left.lock().unwrap().insert(index, times);
        self
    }

    /// Deliver this many chunks, then fail all further chunk calls.
    pub fn go_offline_after(mut self, delivered: usize) -> Self {
        self.offline_after = Some(delivered);
        self
    }

    /// Chunk indices that reached the inner API, in delivery order.
    pub fn delivered(&self) -> Vec<u32> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadApi for FlakyApi {
    async fn negotiate(&self, request: &NegotiateRequest) -> Result<NegotiateResponse> {
        self.inner.negotiate(request).await
    }

    async fn put_chunk(
        &self,
        session_id: Uuid,
        chunk_index: u32,
        params: &ChunkUploadParams,
        body: Bytes,
    ) -> Result<ChunkUploadResponse> {
        if let Some(limit) = self.offline_after {
            if self.delivered.lock().unwrap().len() >= limit {
                anyhow::bail!("network unreachable");
            }
        }
        {
            let mut failures = self.failures_left.lock().unwrap();
            if let Some(left) = failures.get_mut(&chunk_index) {
                if *left > 0 {
                    *left -= 1;
                    anyhow::bail!("connection reset while sending chunk {}", chunk_index);
                }
            }
        }

        let response = self
            .inner
            .put_chunk(session_id, chunk_index, params, body)
            .await?;
        self.delivered.lock().unwrap().push(chunk_index);
        Ok(response)
    }

    async fn commit(&self, session_id: Uuid, request: &CommitRequest) -> Result<CommitResponse> {
        self.inner.commit(session_id, request).await
    }
}
