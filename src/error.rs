//! Request-level error type and its HTTP mapping.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::db::StoreError;

pub const INVALID_CREDENTIALS: &str = "invalid credentials";
pub const MISSING_TOKEN: &str = "missing token";
pub const INVALID_TOKEN: &str = "invalid token";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    /// Always one of the fixed messages above.
    #[error("{0}")]
    Auth(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("store unavailable")]
    ServiceUnavailable,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Hashing(_) | AppError::Signing(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message sent to the client. Internal failures are logged, not echoed.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(m) | AppError::Conflict(m) | AppError::NotFound(m) => m.clone(),
            AppError::Auth(m) => (*m).to_string(),
            AppError::ServiceUnavailable => "service temporarily unavailable".into(),
            AppError::Hashing(_) => "failed to hash password".into(),
            AppError::Signing(_) => "failed to generate token".into(),
            AppError::Internal(_) => "internal server error".into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => AppError::Conflict("email already registered".into()),
            StoreError::Unavailable => AppError::ServiceUnavailable,
            StoreError::Database(e) => AppError::Internal(e.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, %status, "request failed");
        }
        let body = serde_json::json!({ "error": self.public_message() });
        (status, Json(body)).into_response()
    }
}
