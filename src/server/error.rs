//! Mapping of session errors onto HTTP responses.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::streaming;

/// Error body: `{"error": "...", "code": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

/// A session error on its way to the client.
#[derive(Debug)]
pub struct AppError(pub streaming::Error);

impl From<streaming::Error> for AppError {
    fn from(e: streaming::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::warn!(code = self.0.code(), "Request failed: {}", self.0);
        } else {
            tracing::debug!(code = self.0.code(), "Request rejected: {}", self.0);
        }

        let body = Json(ErrorBody {
            error: self.0.to_string(),
            code: self.0.code(),
        });

        if self.0.is_retryable() {
            (status, [(header::RETRY_AFTER, "1")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}
