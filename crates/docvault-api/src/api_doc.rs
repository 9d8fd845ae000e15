//! OpenAPI documentation.
//! Handler path annotations use the `/api/v0` prefix from `crate::constants::API_PREFIX`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use docvault_core::models;

/// Returns the OpenAPI spec served at `/api/openapi.json`.
pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Docvault API",
        version = "0.1.0",
        description = "Resumable, deduplicated document ingestion (v0). Files are negotiated by content hash, transferred in chunks, merged and stored, then handed to the processing service by a polling queue. All endpoints are versioned under /api/v0/."
    ),
    paths(
        // Uploads
        handlers::uploads::negotiate_upload,
        handlers::uploads::upload_chunk,
        handlers::uploads::commit_upload,
        // Files
        handlers::files::list_files,
        handlers::files::get_file,
        handlers::files::delete_file,
        // Ingestion queue
        handlers::ingest::trigger_ingest,
        // Processing service callbacks
        handlers::internal::report_status,
    ),
    components(
        schemas(
            models::FileStatus,
            models::FileResponse,
            models::NegotiateRequest,
            models::NegotiateResponse,
            models::ChunkUploadParams,
            models::ChunkUploadResponse,
            models::CommitRequest,
            models::CommitResponse,
            models::ProcessingStatusReport,
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "uploads", description = "Upload negotiation, chunk transfer, and commit"),
        (name = "files", description = "Owner file listing, inspection, and deletion"),
        (name = "ingest", description = "Ingestion queue control"),
        (name = "internal", description = "Callbacks from the processing service")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_every_versioned_route() {
        let spec = get_openapi_spec();
        for path in [
            "/api/v0/uploads/negotiate",
            "/api/v0/uploads/{session_id}/chunks/{chunk_index}",
            "/api/v0/uploads/{session_id}/commit",
            "/api/v0/files",
            "/api/v0/files/{id}",
            "/api/v0/ingest/trigger",
            "/api/v0/internal/files/{id}/status",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
