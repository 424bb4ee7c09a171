//! Custom error types for the API service

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use laundry::SlotError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Custom error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Body could not be read as the expected JSON
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Error reported by the booking manager
    #[error(transparent)]
    Booking(#[from] SlotError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn status_for(err: &SlotError) -> StatusCode {
    match err {
        SlotError::Validation(_) => StatusCode::BAD_REQUEST,
        SlotError::StudentNotFound(_) | SlotError::SlotNotFound(_) | SlotError::NotBooked(_) => {
            StatusCode::NOT_FOUND
        }
        SlotError::DuplicateSlot { .. }
        | SlotError::SlotBooked(_)
        | SlotError::SlotClosed(_)
        | SlotError::FullDayIncomplete { .. } => StatusCode::CONFLICT,
        SlotError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        SlotError::Notification(_) => StatusCode::BAD_GATEWAY,
        SlotError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::BadRequest(msg) => {
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response();
            }
            ApiError::Booking(err) => err,
        };

        let status = status_for(&err);
        let body = match &err {
            SlotError::Validation(fields) => json!({
                "error": "Invalid input",
                "fields": fields,
            }),
            SlotError::FullDayIncomplete {
                created, skipped, ..
            } => json!({
                "error": err.to_string(),
                "created": created,
                "skipped": skipped,
            }),
            SlotError::Notification(e) => {
                error!("Notification failed: {}", e);
                json!({ "error": "Failed to send notification" })
            }
            SlotError::Store(e) => {
                error!("Database error: {}", e);
                json!({ "error": "Database error" })
            }
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
