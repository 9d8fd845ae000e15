//! Upload workflow helpers over HTTP (negotiate → chunks → commit).

use axum_test::{TestResponse, TestServer};
use bytes::Bytes;
use docvault_api::constants::OWNER_ID_HEADER;
use docvault_core::models::{CommitResponse, NegotiateResponse};
use uuid::Uuid;

use super::api_path;
use super::fixtures;

pub async fn negotiate(
    client: &TestServer,
    owner: Uuid,
    filename: &str,
    content_hash: &str,
) -> TestResponse {
    client
        .post(&api_path("/uploads/negotiate"))
        .add_header(OWNER_ID_HEADER, owner.to_string())
        .json(&serde_json::json!({
            "content_hash": content_hash,
            "filename": filename,
        }))
        .await
}

pub async fn put_chunk(
    client: &TestServer,
    owner: Uuid,
    session_id: Uuid,
    chunk_index: u32,
    total_chunks: u32,
    content_hash: &str,
    body: Vec<u8>,
) -> TestResponse {
    client
        .put(&api_path(&format!(
            "/uploads/{}/chunks/{}?total_chunks={}&content_hash={}",
            session_id, chunk_index, total_chunks, content_hash
        )))
        .add_header(OWNER_ID_HEADER, owner.to_string())
        .bytes(Bytes::from(body))
        .await
}

pub async fn commit(
    client: &TestServer,
    owner: Uuid,
    session_id: Uuid,
    filename: &str,
    content_hash: &str,
    total_chunks: u32,
) -> TestResponse {
    client
        .post(&api_path(&format!("/uploads/{}/commit", session_id)))
        .add_header(OWNER_ID_HEADER, owner.to_string())
        .json(&serde_json::json!({
            "filename": filename,
            "content_hash": content_hash,
            "total_chunks": total_chunks,
        }))
        .await
}

/// Result of a full HTTP upload.
pub struct UploadWorkflowResult {
    pub negotiated: NegotiateResponse,
    pub committed: Option<CommitResponse>,
    pub chunks_sent: u32,
}

/// Negotiate, send every chunk the server is missing, and commit. Asserts success.
pub async fn upload_document(
    client: &TestServer,
    owner: Uuid,
    filename: &str,
    data: &[u8],
) -> UploadWorkflowResult {
    let content_hash = fixtures::sha256_hex(data);
    let response = negotiate(client, owner, filename, &content_hash).await;
    assert_eq!(response.status_code(), 200, "negotiate: {}", response.text());
    let negotiated: NegotiateResponse = response.json();

    if !negotiated.needs_upload {
        return UploadWorkflowResult {
            negotiated,
            committed: None,
            chunks_sent: 0,
        };
    }

    let chunks = fixtures::split_chunks(data, negotiated.chunk_size as usize);
    let total = chunks.len() as u32;
    let mut sent = 0;
    for (index, chunk) in chunks.into_iter().enumerate() {
        let index = index as u32;
        if negotiated.already_staged_chunk_indices.contains(&index) {
            continue;
        }
        let response = put_chunk(
            client,
            owner,
            negotiated.session_id,
            index,
            total,
            &content_hash,
            chunk,
        )
        .await;
        assert_eq!(response.status_code(), 200, "chunk {}: {}", index, response.text());
        sent += 1;
    }

    let response = commit(
        client,
        owner,
        negotiated.session_id,
        filename,
        &content_hash,
        total,
    )
    .await;
    assert_eq!(response.status_code(), 200, "commit: {}", response.text());

    UploadWorkflowResult {
        negotiated,
        committed: Some(response.json()),
        chunks_sent: sent,
    }
}
