//! Client for the external content-processing service.
//!
//! The queue calls [`ProcessingService::ingest`] once per claimed file. Acceptance is
//! all that is awaited; completion is reported back out-of-band.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Processing service timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Processing service rejected file: {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("Processing service unreachable: {0}")]
    Unavailable(String),
}

/// The ingest boundary: `ingest(file_id) -> accepted | error`.
#[async_trait]
pub trait ProcessingService: Send + Sync {
    async fn ingest(&self, file_id: Uuid) -> Result<(), ProcessingError>;
}

#[derive(Serialize)]
struct IngestRequest {
    file_id: Uuid,
}

/// HTTP implementation: `POST {base_url}/ingest` with `{"file_id": ...}`.
#[derive(Clone)]
pub struct HttpProcessingService {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpProcessingService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for processing service")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl ProcessingService for HttpProcessingService {
    #[tracing::instrument(skip(self), fields(processing.url = %self.base_url))]
    async fn ingest(&self, file_id: Uuid) -> Result<(), ProcessingError> {
        let url = format!("{}/ingest", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&IngestRequest { file_id })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProcessingError::Timeout(self.timeout)
                } else {
                    ProcessingError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProcessingError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(file_id = %file_id, "Processing service accepted file");
        Ok(())
    }
}
