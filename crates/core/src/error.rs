// Error taxonomy shared by the gateway and the backends
// Decision: Every failure surfaced over HTTP is an ApiError with a fixed status
// Decision: Response body is always {"error": "<message>"}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard error response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Error message describing what went wrong.
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Errors surfaced to HTTP callers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Access token signature, type or expiry failure
    #[error("Invalid token")]
    InvalidToken,

    /// Refresh token signature, type, expiry or reuse failure
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Missing refresh token")]
    MissingRefreshToken,

    /// Login with an unknown email or a wrong password
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// No principal could be resolved
    #[error("Unauthorized")]
    Unauthorized,

    /// Principal lacks the entitlement; refreshing does not help
    #[error("Forbidden")]
    Forbidden,

    /// First path segment does not name a registered service
    #[error("Unknown service")]
    UnknownService,

    #[error("{0}")]
    NotFound(String),

    /// Business rule failure (duplicate email, missing parameter, ...)
    #[error("{0}")]
    Validation(String),

    /// Upstream could not be reached or the exchange broke off
    #[error("Upstream unavailable")]
    UpstreamUnavailable,

    /// Upstream did not answer in time
    #[error("Upstream timeout")]
    UpstreamTimeout,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidToken
            | ApiError::InvalidRefreshToken
            | ApiError::MissingRefreshToken
            | ApiError::InvalidCredentials
            | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::UnknownService | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
