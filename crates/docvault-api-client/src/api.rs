//! Typed endpoints on top of [`ApiClient`].

use crate::{api_prefix, ApiClient};
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use docvault_core::models::{
    ChunkUploadParams, ChunkUploadResponse, CommitRequest, CommitResponse, FileResponse,
    NegotiateRequest, NegotiateResponse,
};
use uuid::Uuid;

/// The three calls the upload flow needs. Implemented by [`ApiClient`] over HTTP;
/// tests implement it over an in-process service.
#[async_trait]
pub trait UploadApi: Send + Sync {
    async fn negotiate(&self, request: &NegotiateRequest) -> Result<NegotiateResponse>;

    async fn put_chunk(
        &self,
        session_id: Uuid,
        chunk_index: u32,
        params: &ChunkUploadParams,
        body: Bytes,
    ) -> Result<ChunkUploadResponse>;

    async fn commit(&self, session_id: Uuid, request: &CommitRequest) -> Result<CommitResponse>;
}

#[async_trait]
impl UploadApi for ApiClient {
    async fn negotiate(&self, request: &NegotiateRequest) -> Result<NegotiateResponse> {
        let path = format!("{}/uploads/negotiate", api_prefix());
        self.post_json(&path, request).await
    }

    async fn put_chunk(
        &self,
        session_id: Uuid,
        chunk_index: u32,
        params: &ChunkUploadParams,
        body: Bytes,
    ) -> Result<ChunkUploadResponse> {
        let path = format!(
            "{}/uploads/{}/chunks/{}",
            api_prefix(),
            session_id,
            chunk_index
        );
        let query = [
            ("total_chunks", params.total_chunks.to_string()),
            ("content_hash", params.content_hash.clone()),
        ];
        self.put_bytes(&path, &query, body).await
    }

    async fn commit(&self, session_id: Uuid, request: &CommitRequest) -> Result<CommitResponse> {
        let path = format!("{}/uploads/{}/commit", api_prefix(), session_id);
        self.post_json(&path, request).await
    }
}

impl ApiClient {
    pub async fn list_files(&self) -> Result<Vec<FileResponse>> {
        self.get(&format!("{}/files", api_prefix())).await
    }

    pub async fn get_file(&self, id: Uuid) -> Result<FileResponse> {
        self.get(&format!("{}/files/{}", api_prefix(), id)).await
    }

    pub async fn delete_file(&self, id: Uuid) -> Result<()> {
        self.delete(&format!("{}/files/{}", api_prefix(), id)).await
    }

    /// Ask the server to attempt an immediate queue pickup.
    pub async fn trigger_ingest(&self) -> Result<()> {
        self.post_empty(&format!("{}/ingest/trigger", api_prefix()))
            .await
    }
}
