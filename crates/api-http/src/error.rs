//! HTTP Error Types
//!
//! Maps broker errors to HTTP status codes.

use crate::types::ErrorResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fanout_core::BrokerError;

/// Stable error codes carried in `ErrorResponse::code`
pub mod code {
    pub const QUEUE_NOT_FOUND: &str = "queue_not_found";
    pub const QUEUE_FULL: &str = "queue_full";
    pub const TOO_MANY_SUBSCRIBERS: &str = "too_many_subscribers";
    pub const QUEUE_CLOSED: &str = "queue_closed";
    pub const INVALID_BODY: &str = "invalid_body";
}

/// Structured API error: status code plus JSON body
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Convert BrokerError to an HTTP error
///
/// Backpressure (`QueueFull`, `TooManySubscribers`) and shutdown
/// (`QueueClosed`) all surface as 503 so clients can retry later.
pub fn to_api_error(err: BrokerError) -> ApiError {
    let message = err.to_string();
    match err {
        BrokerError::QueueNotFound(_) => {
            ApiError::new(StatusCode::NOT_FOUND, code::QUEUE_NOT_FOUND, message)
        }
        BrokerError::QueueFull(_) => {
            ApiError::new(StatusCode::SERVICE_UNAVAILABLE, code::QUEUE_FULL, message)
        }
        BrokerError::TooManySubscribers(_) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            code::TOO_MANY_SUBSCRIBERS,
            message,
        ),
        BrokerError::QueueClosed(_) => {
            ApiError::new(StatusCode::SERVICE_UNAVAILABLE, code::QUEUE_CLOSED, message)
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        to_api_error(err)
    }
}

/// Build a 400 error for a request body that is not valid JSON
pub fn api_invalid_body(message: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, code::INVALID_BODY, message)
}
