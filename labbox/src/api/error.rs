//! Error responses.

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use labbox_shared::errors::{ErrorKind, LabboxError};
use serde::Serialize;

/// A [`LabboxError`] rendered as `{code, message}`.
#[derive(Debug)]
pub struct ApiError(pub LabboxError);

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: u32,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::ResourceExhausted => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::RuntimeFailure | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LabboxError> for ApiError {
    fn from(err: LabboxError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }
        let body = ErrorBody {
            code: self.0.code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
