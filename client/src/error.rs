//! Error taxonomy for CRUD calls.
//!
//! ERROR HANDLING
//! ==============
//! Validation failures are raised before any request is built and never reach
//! the backend. Everything else comes back from the transport or from the
//! response status: 404 becomes [`CrudError::NotFound`], 409 becomes
//! [`CrudError::Conflict`], and any other non-2xx status is a
//! [`NetworkError::Status`].

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;

use records::ValidationError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The request could not be sent or the connection dropped.
    #[error("request failed: {0}")]
    Request(String),

    /// No response arrived within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The backend answered with a non-success status.
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    ClientBuild(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CrudError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl CrudError {
    /// Machine-readable code, matching the codes the backend puts in error bodies.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E_VALIDATION",
            Self::Network(NetworkError::Status { .. }) => "E_STATUS",
            Self::Network(NetworkError::Decode(_)) => "E_DECODE",
            Self::Network(_) => "E_NETWORK",
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::Conflict(_) => "E_CONFLICT",
            Self::Config(_) => "E_CONFIG",
        }
    }

    /// Whether the same request may succeed if issued again unchanged.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(
                NetworkError::Request(_) | NetworkError::Timeout(_) | NetworkError::Status { status: 429 | 500..=599, .. }
            )
        )
    }

    /// Whether the error was raised locally, before anything was sent.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Config(_))
    }
}
