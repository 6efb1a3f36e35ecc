//! HTTP error mapping.
//!
//! ERROR HANDLING
//! ==============
//! Every handler error becomes an [`ApiError`] whose body is
//! `{"error": <message>, "code": <E_...>, "retryable": <bool>}`. The status
//! comes from [`store_error_to_status`] for storage errors, 400 for a list
//! query that does not validate, and 422 for a record that does not.

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use records::ValidationError;
use tracing::{error, warn};

use crate::services::StoreError;

/// Grepable error code and retryable flag for structured error bodies.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

impl ErrorCode for ValidationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownSortKey { .. } | Self::MissingSortKey | Self::UnknownOrder(_) => "E_BAD_SORT",
            Self::InvalidPageSize { .. } => "E_BAD_PAGE",
            Self::UnsupportedFilter { .. } => "E_BAD_FILTER",
            _ => "E_VALIDATION",
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, err: &(impl ErrorCode + ?Sized)) -> Self {
        Self { status, code: err.error_code(), message: err.to_string(), retryable: err.retryable() }
    }

    /// A list query that does not validate.
    pub fn bad_query(err: &ValidationError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err)
    }

    /// A record or draft that does not validate.
    pub fn invalid(err: &ValidationError) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, err)
    }
}

pub(crate) fn store_error_to_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = store_error_to_status(&err);
        if status.is_server_error() {
            error!(error = %err, "store failure");
        }
        Self::new(status, &err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            warn!(status = self.status.as_u16(), code = self.code, error = %self.message, "request rejected");
        }
        let body = serde_json::json!({
            "error": self.message,
            "code": self.code,
            "retryable": self.retryable,
        });
        (self.status, Json(body)).into_response()
    }
}
