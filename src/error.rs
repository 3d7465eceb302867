//! # Error Handling
//!
//! HTTP-facing error type. Handlers return [`AppResult`] and actix turns an
//! [`AppError`] into a JSON response through [`ResponseError`].
//!
//! ## JSON Response Format:
//! ```json
//! {
//!   "error": {
//!     "type": "conflict",
//!     "message": "Session ID 'abc' is already active",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```
//!
//! Errors inside a running session never reach this type: once the WebSocket is
//! upgraded there is no HTTP response left to fail.

use crate::session::RegistryError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// Invalid query parameters or a failed WebSocket handshake
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// A live session already uses the requested identifier
    Conflict(String),

    /// The server is at its concurrent session limit
    ServiceUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.parts().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = self.parts();

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// A full registry maps to 503 so clients retry later; a duplicate id is a 409.
impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Full(_) => AppError::ServiceUnavailable(err.to_string()),
            RegistryError::Duplicate(_) => AppError::Conflict(err.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
