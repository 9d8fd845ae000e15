use crate::error::ErrorResponse;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, StatusCode};
use axum::Json;
use uuid::Uuid;

/// Owner context resolved by [`identity_middleware`](super::identity_middleware) and
/// stored in request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerContext {
    pub owner_id: Uuid,
}

impl OwnerContext {
    pub fn new(owner_id: Uuid) -> Self {
        Self { owner_id }
    }
}

pub(crate) fn missing_owner_rejection(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::full(
            message,
            "MISSING_OWNER_CONTEXT",
            false,
            Some("Send the owner id in the X-Owner-Id header"),
        )),
    )
}

impl<S> FromRequestParts<S> for OwnerContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OwnerContext>()
            .copied()
            .ok_or_else(|| missing_owner_rejection("Missing owner context"))
    }
}
