//! HTTP error mapping
//!
//! Every failure leaves the service as `{"error": {"code", "message"}}` with
//! a status chosen from the engine error kind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tagtrust_common::Error;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed caller identity (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller lacks the admin role (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Engine error
    #[error(transparent)]
    Engine(#[from] Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Engine(err) => match err {
                Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
                Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                Error::Duplicate(_) => (StatusCode::CONFLICT, "DUPLICATE"),
                Error::NotOwner(_) => (StatusCode::FORBIDDEN, "NOT_OWNER"),
                Error::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                Error::AlreadyDecided(_) => (StatusCode::CONFLICT, "ALREADY_DECIDED"),
                Error::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
                Error::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "TRY_AGAIN"),
                Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Storage details stay in the log
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
