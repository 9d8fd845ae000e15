//! Resumable upload protocol: negotiate, chunk transfer, commit.

use crate::auth::OwnerContext;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::rejection::{BytesRejection, PathRejection, QueryRejection},
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use docvault_core::models::{
    ChunkUploadParams, ChunkUploadResponse, CommitRequest, CommitResponse, NegotiateRequest,
    NegotiateResponse,
};
use std::sync::Arc;
use uuid::Uuid;

/// Negotiate an upload session for a content hash
///
/// Returns a completed duplicate when the content is already stored, the staged chunk
/// indices when the owner has an unfinished session for the same content, or a new session.
#[utoipa::path(
    post,
    path = "/api/v0/uploads/negotiate",
    tag = "uploads",
    request_body = NegotiateRequest,
    responses(
        (status = 200, description = "Negotiation outcome", body = NegotiateResponse),
        (status = 400, description = "Invalid input or disallowed extension", body = ErrorResponse),
        (status = 401, description = "Missing owner context", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn negotiate_upload(
    owner: OwnerContext,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<NegotiateRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let response = state.ingest.negotiate(owner.owner_id, request).await?;
    Ok(Json(response))
}

/// Upload one chunk as the raw request body
#[utoipa::path(
    put,
    path = "/api/v0/uploads/{session_id}/chunks/{chunk_index}",
    tag = "uploads",
    params(
        ("session_id" = Uuid, Path, description = "Upload session ID"),
        ("chunk_index" = u32, Path, description = "Zero-based chunk index"),
        ("total_chunks" = u32, Query, description = "Total number of chunks in the file"),
        ("content_hash" = String, Query, description = "Content hash of the whole file")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Chunk staged", body = ChunkUploadResponse),
        (status = 400, description = "Invalid chunk", body = ErrorResponse),
        (status = 404, description = "Upload session not found", body = ErrorResponse),
        (status = 409, description = "Session not uploading or content hash mismatch", body = ErrorResponse),
        (status = 413, description = "Chunk too large", body = ErrorResponse)
    )
)]
pub async fn upload_chunk(
    owner: OwnerContext,
    State(state): State<Arc<AppState>>,
    path: Result<Path<(Uuid, u32)>, PathRejection>,
    query: Result<Query<ChunkUploadParams>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Path((session_id, chunk_index)) = path?;
    let Query(params) = query?;
    let body = body?;

    let response = state
        .ingest
        .receive_chunk(owner.owner_id, session_id, chunk_index, params, body)
        .await?;
    Ok(Json(response))
}

/// Merge the staged chunks and commit the file
#[utoipa::path(
    post,
    path = "/api/v0/uploads/{session_id}/commit",
    tag = "uploads",
    params(
        ("session_id" = Uuid, Path, description = "Upload session ID")
    ),
    request_body = CommitRequest,
    responses(
        (status = 200, description = "File committed and queued for processing", body = CommitResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 404, description = "Upload session not found", body = ErrorResponse),
        (status = 409, description = "Chunk count or content hash mismatch", body = ErrorResponse),
        (status = 502, description = "Blob store unavailable, retry the commit", body = ErrorResponse)
    )
)]
pub async fn commit_upload(
    owner: OwnerContext,
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
    ValidatedJson(request): ValidatedJson<CommitRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Path(session_id) = path?;
    let response = state
        .ingest
        .commit(owner.owner_id, session_id, request)
        .await?;
    Ok(Json(response))
}
