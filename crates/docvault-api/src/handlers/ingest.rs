use crate::auth::OwnerContext;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

/// Ask the ingestion queue for an immediate pickup instead of waiting for the next tick
#[utoipa::path(
    post,
    path = "/api/v0/ingest/trigger",
    tag = "ingest",
    responses(
        (status = 202, description = "Pickup requested")
    )
)]
pub async fn trigger_ingest(
    _owner: OwnerContext,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    state.ingest.trigger();
    StatusCode::ACCEPTED
}
