//! API error handling
//!
//! Every failure leaves the server as `{code, message, details?}` with a
//! status from a fixed taxonomy. Internal causes are logged, never returned.
//!
//! Author: hephaex@gmail.com

use crate::auth::jwt::TokenError;
use crate::auth::password::PasswordError;
use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use keygate_core::{KeygateError, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Per-field validation messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, Vec<String>>>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: BTreeMap<String, Vec<String>>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "Invalid credentials")
    }

    pub fn forbidden() -> Self {
        Self::new("FORBIDDEN", "Access denied")
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// Request body failed validation; map is `field -> messages`
    Validation(BTreeMap<String, Vec<String>>),
    Conflict(String),
    /// Authentication failed; the response never says why
    Unauthorized,
    Forbidden(String),
    TooManyRequests { retry_after_secs: u64 },
    Internal(String),
    Database(String),
}

impl AppError {
    /// Single-field validation failure
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        let mut details = BTreeMap::new();
        details.insert(field.to_string(), vec![message.into()]);
        AppError::Validation(details)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NotFound(what) => write!(f, "{what} not found"),
            AppError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            AppError::Validation(details) => write!(f, "validation failed: {details:?}"),
            AppError::Conflict(msg) => write!(f, "conflict: {msg}"),
            AppError::Unauthorized => write!(f, "unauthorized"),
            AppError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            AppError::TooManyRequests { retry_after_secs } => {
                write!(f, "rate limited, retry after {retry_after_secs}s")
            }
            AppError::Internal(msg) => write!(f, "internal error: {msg}"),
            AppError::Database(msg) => write!(f, "database error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut retry_after = None;

        let error = match self {
            AppError::NotFound(what) => ApiError::not_found(&what),
            AppError::BadRequest(msg) => ApiError::bad_request(msg),
            AppError::Validation(details) => {
                ApiError::new("VALIDATION_ERROR", "Request validation failed").with_details(details)
            }
            AppError::Conflict(msg) => ApiError::new("CONFLICT", msg),
            AppError::Unauthorized => ApiError::unauthorized(),
            AppError::Forbidden(msg) => ApiError::new("FORBIDDEN", msg),
            AppError::TooManyRequests { retry_after_secs } => {
                retry_after = Some(retry_after_secs);
                ApiError::new("TOO_MANY_REQUESTS", "Too many requests, slow down")
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ApiError::internal_error()
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                ApiError::internal_error()
            }
        };

        let mut response = (status, Json(error)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound => AppError::NotFound("User".to_string()),
            StoreError::EmailAlreadyExists => {
                AppError::Conflict("An account with this email already exists".to_string())
            }
            StoreError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

impl From<KeygateError> for AppError {
    fn from(err: KeygateError) -> Self {
        match err {
            KeygateError::NotFound(what) => AppError::NotFound(what),
            KeygateError::ValidationError(msg) => AppError::BadRequest(msg),
            KeygateError::Store(err) => err.into(),
            KeygateError::Config(err) => AppError::Internal(format!("Configuration error: {err}")),
            KeygateError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Empty | PasswordError::TooLong => {
                AppError::invalid_field("password", err.to_string())
            }
            PasswordError::HashingFailed(msg) => AppError::Internal(msg),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired | TokenError::Malformed | TokenError::BadSignature => {
                AppError::Unauthorized
            }
            TokenError::Encoding(e) => AppError::Internal(format!("Token encoding failed: {e}")),
            TokenError::SystemTime(e) => AppError::Internal(format!("Clock error: {e}")),
        }
    }
}

/// Unreadable request bodies are client errors in the usual shape
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                AppError::BadRequest("Expected `Content-Type: application/json`".to_string())
            }
            other => AppError::BadRequest(other.body_text()),
        }
    }
}
