/// Unified error types for the LearnHub service
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Main error type for the HTTP service
#[derive(Error, Debug)]
pub enum HubError {
    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Validation errors
    #[error("{0}")]
    Validation(String),

    /// Validation errors tied to specific request fields
    #[error("{message}")]
    FieldValidation {
        message: String,
        fields: Vec<FieldError>,
    },

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate key)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Hosted backend unreachable or failing
    #[error("Backend unavailable: {0}")]
    Backend(String),

    /// Email delivery errors
    #[error("{0}")]
    Email(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl From<StoreError> for HubError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => HubError::NotFound(what),
            StoreError::Conflict(what) => HubError::Conflict(what),
            StoreError::Unauthorized(what) => HubError::Authorization(what),
            StoreError::Transient(msg) => HubError::Backend(msg),
            StoreError::Backend(msg) => HubError::Internal(msg),
        }
    }
}

/// Convert HubError to HTTP response
impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let mut fields = Vec::new();
        let (status, error_code, message) = match self {
            HubError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            HubError::Authorization(_) => (StatusCode::FORBIDDEN, "Forbidden", self.to_string()),
            HubError::Validation(_) => (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string()),
            HubError::FieldValidation {
                message,
                fields: errors,
            } => {
                fields = errors;
                (StatusCode::BAD_REQUEST, "InvalidRequest", message)
            }
            HubError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            HubError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            HubError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            HubError::Backend(_) => (
                StatusCode::BAD_GATEWAY,
                "BackendUnavailable",
                "Backend temporarily unavailable, please retry".to_string(),
            ),
            HubError::Email(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "EmailFailed",
                self.to_string(),
            ),
            HubError::Internal(_) | HubError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            fields,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type HubResult<T> = Result<T, HubError>;
