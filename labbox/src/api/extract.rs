//! Request extractors.

use axum::extract::FromRequestParts;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use http::request::Parts;
use labbox_shared::constants::api::USER_ID_HEADER;

/// Authenticated user id taken from the `x-user-id` header.
///
/// Requests without a non-empty header are rejected with 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, "missing user id").into_response())
    }
}
