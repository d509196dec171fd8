//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::db::LedgerError;

pub type AppResult<T> = Result<T, AppError>;

/// Shown to clients instead of internal failure details
pub const INTERNAL_ERROR_MESSAGE: &str =
    "An unexpected server error occurred. Check server logs for job details.";

#[derive(Debug)]
pub enum AppError {
    // Startup errors
    ServiceUnavailable,

    // Request errors
    BadRequest(String),
    NotFound(String),

    // Feature validation errors (sanitized message)
    ValidationFailed(String),

    // Database errors
    DatabaseError(String),

    // Generic errors
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service not available. Check server startup logs.",
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.as_str()),
            AppError::ValidationFailed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.as_str()),
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}
