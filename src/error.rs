// Error handling module
// Defines error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors that can occur while serving a queue request
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Login at the Protege auth endpoint failed or returned garbage
    #[error("Authentication failed: {status} - {body}")]
    AuthError { status: u16, body: String },

    /// Queue lookup failed (after the single 401 retry, if any)
    #[error("Protege API error: {status} - {body}")]
    UpstreamError { status: u16, body: String },

    /// Transport failure talking to Protege (timeout, refused, reset)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Short label used for metrics and the `type` field of error bodies
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::ConfigError(_) => "config_error",
            ApiError::AuthError { .. } => "auth_error",
            ApiError::UpstreamError { .. } => "upstream_error",
            ApiError::NetworkError(_) => "network_error",
            ApiError::ValidationError(_) => "validation_error",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

/// Pass through upstream 4xx/5xx codes; anything else is ambiguous and becomes 500
fn upstream_status(status: u16) -> StatusCode {
    match StatusCode::from_u16(status) {
        Ok(code) if code.is_client_error() || code.is_server_error() => code,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_type = self.error_type();

        let (status, message) = match self {
            ApiError::ConfigError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::AuthError { status, body } => {
                tracing::error!(
                    upstream_status = status,
                    upstream_body = %body,
                    "Protege authentication failed"
                );
                let code = match status {
                    401 | 403 => StatusCode::UNAUTHORIZED,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (code, "Authentication with queue service failed".to_string())
            }
            ApiError::UpstreamError { status, body } => {
                tracing::error!(
                    upstream_status = status,
                    upstream_body = %body,
                    "Protege queue lookup failed"
                );
                (
                    upstream_status(status),
                    format!("Queue API failed: {}", status),
                )
            }
            ApiError::NetworkError(detail) => {
                tracing::error!("Network error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to reach queue service".to_string(),
                )
            }
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "type": error_type,
        }));

        (status, body).into_response()
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
