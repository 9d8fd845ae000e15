//! Callbacks from the processing service.

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::rejection::PathRejection,
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use docvault_core::models::{FileResponse, ProcessingStatusReport};
use std::sync::Arc;
use uuid::Uuid;

/// Report processing progress or outcome for a file
#[utoipa::path(
    post,
    path = "/api/v0/internal/files/{id}/status",
    tag = "internal",
    params(
        ("id" = Uuid, Path, description = "File ID"),
        ("X-Service-Key" = String, Header, description = "Processing service key")
    ),
    request_body = ProcessingStatusReport,
    responses(
        (status = 200, description = "Status recorded", body = FileResponse),
        (status = 400, description = "Invalid report", body = ErrorResponse),
        (status = 401, description = "Invalid service key", body = ErrorResponse),
        (status = 404, description = "File not found or callback disabled", body = ErrorResponse),
        (status = 409, description = "Transition not allowed from the current status", body = ErrorResponse)
    )
)]
pub async fn report_status(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
    ValidatedJson(report): ValidatedJson<ProcessingStatusReport>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Path(id) = path?;
    let file = state.ingest.report_status(id, report).await?;
    Ok(Json(file))
}
