//! Server-specific error types
//!
//! One variant per failure class so callers can tell a rejected parameter
//! from a failed callback POST programmatically. Validation, upload, and
//! submission errors are returned synchronously to the submitting caller;
//! polling-phase errors never reach it and are reported via notification.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for server operations
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(#[from] crate::training::params::ValidationError),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Job submission rejected: {0}")]
    Submission(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State decryption failed: {0}")]
    Decryption(String),

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Token persistence failed: {0}")]
    Persist(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(ref e) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Upload(ref message) => {
                tracing::error!("Upload error: {}", message);
                (StatusCode::BAD_GATEWAY, message.clone())
            },
            AppError::Submission(ref message) => {
                tracing::error!("Submission error: {}", message);
                (StatusCode::BAD_GATEWAY, message.clone())
            },
            AppError::Config(ref message) => {
                tracing::error!("Configuration error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error".to_string())
            },
            AppError::Decryption(ref message) => {
                tracing::error!("State decryption error: {}", message);
                (StatusCode::BAD_REQUEST, "Invalid state parameter".to_string())
            },
            AppError::Exchange(ref message) => {
                tracing::error!("Token exchange error: {}", message);
                (StatusCode::BAD_GATEWAY, message.clone())
            },
            AppError::Persist(ref message) => {
                tracing::error!("Token persistence error: {}", message);
                (StatusCode::BAD_GATEWAY, message.clone())
            },
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            },
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<crate::oauth::exchange::OAuthError> for AppError {
    fn from(err: crate::oauth::exchange::OAuthError) -> Self {
        use crate::oauth::exchange::OAuthError;
        match err {
            OAuthError::Decryption(msg) => AppError::Decryption(msg),
            OAuthError::Exchange(msg) => AppError::Exchange(msg),
            OAuthError::Persist(msg) => AppError::Persist(msg),
        }
    }
}
