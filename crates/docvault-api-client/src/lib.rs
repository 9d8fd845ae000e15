//! HTTP client and client-side upload pipeline for the Docvault API.
//!
//! [`ApiClient`] is a thin JSON client that sends the owner identity on every request.
//! The upload flow is split the same way as on the server:
//!
//! - [`hasher`]: content digest on a blocking worker, streaming progress events
//! - [`transfer`]: bounded-concurrency chunk transfer with per-chunk retry
//! - [`uploader`]: hash → negotiate → transfer missing chunks → commit
//!
//! The uploader talks to the server through the [`UploadApi`] trait so it can run
//! against the HTTP client or an in-process service.

pub mod api;
pub mod hasher;
pub mod transfer;
pub mod uploader;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

/// Header carrying the owner identity, as resolved by the upstream auth layer.
pub const OWNER_ID_HEADER: &str = "X-Owner-Id";

/// API version prefix (e.g. "/api/v0"). Set DOCVAULT_API_VERSION to match the server.
pub fn api_prefix() -> String {
    let version = std::env::var("DOCVAULT_API_VERSION").unwrap_or_else(|_| "v0".to_string());
    format!("/api/{}", version)
}

/// HTTP client for the Docvault API acting on behalf of one owner.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    owner_id: Uuid,
}

impl ApiClient {
    pub fn new(base_url: String, owner_id: Uuid) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            owner_id,
        })
    }

    /// Create client from environment: DOCVAULT_API_URL (default `http://localhost:4000`)
    /// and DOCVAULT_OWNER_ID.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("DOCVAULT_API_URL")
            .unwrap_or_else(|_| "http://localhost:4000".to_string());

        let owner_id = std::env::var("DOCVAULT_OWNER_ID")
            .context("Missing owner id. Set DOCVAULT_OWNER_ID")?;
        let owner_id = Uuid::parse_str(owner_id.trim())
            .context("DOCVAULT_OWNER_ID must be a UUID")?;

        Self::new(base_url, owner_id)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_owner(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(OWNER_ID_HEADER, self.owner_id.to_string())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .apply_owner(request)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json()
            .await
            .context("Failed to parse response as JSON")
    }

    /// GET request. Deserializes JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.client.get(self.build_url(path))).await?;
        Self::read_json(response).await
    }

    /// POST JSON body and deserialize response.
    pub async fn post_json<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = self.client.post(self.build_url(path)).json(body);
        let response = self.send(request).await?;
        Self::read_json(response).await
    }

    /// PUT a raw body with query parameters and deserialize response.
    pub async fn put_bytes<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: bytes::Bytes,
    ) -> Result<T> {
        let request = self
            .client
            .put(self.build_url(path))
            .query(query)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body);
        let response = self.send(request).await?;
        Self::read_json(response).await
    }

    /// POST without a body; only the status matters.
    pub async fn post_empty(&self, path: &str) -> Result<()> {
        self.send(self.client.post(self.build_url(path))).await?;
        Ok(())
    }

    /// DELETE request. Returns Ok(()) on success.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(self.client.delete(self.build_url(path))).await?;
        Ok(())
    }

    /// Raw client for custom requests. Caller must add the owner header.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

pub use api::UploadApi;
pub use docvault_core::models::{
    ChunkUploadParams, ChunkUploadResponse, CommitRequest, CommitResponse, FileResponse,
    FileStatus, NegotiateRequest, NegotiateResponse,
};
pub use hasher::{compute_content_hash, hash_file, HashError, HashEvent, DEFAULT_HASH_CHUNK_SIZE};
pub use transfer::{chunk_count, ChunkPlan, ChunkTransferManager, TransferConfig, TransferReport};
pub use uploader::{UploadOutcome, UploadStage, Uploader};
