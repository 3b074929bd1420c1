//! HTTP rendering of service errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::AppError;
use serde::Serialize;

/// Error body: `{"status": 404, "message": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
}

/// API-level error wrapping the service taxonomy.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.status_code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "internal server error");
        }

        let body = ErrorBody {
            status: status.as_u16(),
            message: self.0.message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
