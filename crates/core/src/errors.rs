//! Error types shared across the sync crates.

use thiserror::Error;

use crate::utils::normalize::ShapeError;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Retry policy class for failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Errors that can occur while syncing the cache with the remote store or
/// polling external sources.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote call did not complete (connection, TLS, body read).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The remote answered but the payload could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request (missing id, bad configuration, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The call exceeded its deadline.
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Local persistence failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Unexpected collection payload shape.
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    /// External event source failure.
    #[error("Source error ({origin}): {message}")]
    Source {
        origin: &'static str,
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a local cache error
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Create an external source error
    pub fn external(origin: &'static str, message: impl Into<String>) -> Self {
        Self::Source {
            origin,
            message: message.into(),
        }
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Api { status, .. } => crate::sync::classify_http_status(*status),
            Self::Transport(_) | Self::Timeout(_) | Self::Cache(_) | Self::Source { .. } => {
                RetryClass::Retryable
            }
            Self::Parse(_) | Self::Shape(_) | Self::Json(_) | Self::InvalidRequest(_) => {
                RetryClass::Permanent
            }
        }
    }
}
