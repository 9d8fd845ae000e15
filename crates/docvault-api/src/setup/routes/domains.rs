//! Domain route groups (uploads, files, ingest, internal callbacks).

use crate::auth::service_key_middleware;
use crate::handlers;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use docvault_core::Config;
use std::sync::Arc;

use crate::constants::API_PREFIX;

pub fn upload_routes(config: &Config) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{}/uploads/negotiate", API_PREFIX),
            post(handlers::uploads::negotiate_upload),
        )
        .route(
            &format!("{}/uploads/{{session_id}}/chunks/{{chunk_index}}", API_PREFIX),
            put(handlers::uploads::upload_chunk)
                .layer(DefaultBodyLimit::max(config.max_chunk_size_bytes())),
        )
        .route(
            &format!("{}/uploads/{{session_id}}/commit", API_PREFIX),
            post(handlers::uploads::commit_upload),
        )
}

pub fn file_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{}/files", API_PREFIX),
            get(handlers::files::list_files),
        )
        .route(
            &format!("{}/files/{{id}}", API_PREFIX),
            get(handlers::files::get_file).delete(handlers::files::delete_file),
        )
}

pub fn ingest_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        &format!("{}/ingest/trigger", API_PREFIX),
        post(handlers::ingest::trigger_ingest),
    )
}

/// Processing service callbacks, guarded by the service key instead of owner identity
pub fn internal_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{}/internal/files/{{id}}/status", API_PREFIX),
            post(handlers::internal::report_status),
        )
        .layer(axum::middleware::from_fn_with_state(
            state,
            service_key_middleware,
        ))
}
