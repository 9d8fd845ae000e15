use crate::auth::OwnerContext;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;
use axum::{
    extract::rejection::PathRejection,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use docvault_core::models::FileResponse;
use std::sync::Arc;
use uuid::Uuid;

/// List the owner's files, newest first
#[utoipa::path(
    get,
    path = "/api/v0/files",
    tag = "files",
    responses(
        (status = 200, description = "Files of the owner", body = Vec<FileResponse>),
        (status = 401, description = "Missing owner context", body = ErrorResponse)
    )
)]
pub async fn list_files(
    owner: OwnerContext,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let files = state.ingest.list(owner.owner_id).await?;
    Ok(Json(files))
}

/// Get one file with its status, progress, and error message
#[utoipa::path(
    get,
    path = "/api/v0/files/{id}",
    tag = "files",
    params(
        ("id" = Uuid, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File found", body = FileResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
pub async fn get_file(
    owner: OwnerContext,
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Path(id) = path?;
    let file = state.ingest.get(owner.owner_id, id).await?;
    Ok(Json(file))
}

/// Delete a file; its blob is removed once no other file references it
#[utoipa::path(
    delete,
    path = "/api/v0/files/{id}",
    tag = "files",
    params(
        ("id" = Uuid, Path, description = "File ID")
    ),
    responses(
        (status = 204, description = "File deleted"),
        (status = 404, description = "File not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, path),
    fields(owner_id = %owner.owner_id, operation = "delete_file")
)]
pub async fn delete_file(
    owner: OwnerContext,
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Path(id) = path?;
    state.ingest.delete(owner.owner_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
