use crate::auth::models::{missing_owner_rejection, OwnerContext};
use crate::constants::{OWNER_ID_HEADER, SERVICE_KEY_HEADER};
use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use docvault_core::AppError;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Resolve [`OwnerContext`] from the trusted `X-Owner-Id` header.
pub async fn identity_middleware(mut request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(OWNER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim);

    let owner_id = match header {
        Some(value) => match Uuid::parse_str(value) {
            Ok(id) => id,
            Err(_) => {
                tracing::debug!(header = value, "Malformed owner id header");
                return missing_owner_rejection("Owner id must be a UUID").into_response();
            }
        },
        None => return missing_owner_rejection("Missing owner context").into_response(),
    };

    request.extensions_mut().insert(OwnerContext::new(owner_id));
    next.run(request).await
}

/// Guard for the processing service callback. The route does not exist (404) unless
/// `SERVICE_API_KEY` is configured.
pub async fn service_key_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.service_api_key() else {
        return HttpAppError(AppError::NotFound("Not found".to_string())).into_response();
    };

    let presented = request
        .headers()
        .get(SERVICE_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    match presented {
        Some(key) if secure_compare(key, expected) => next.run(request).await,
        _ => HttpAppError(AppError::Unauthorized("Invalid service key".to_string()))
            .into_response(),
    }
}
