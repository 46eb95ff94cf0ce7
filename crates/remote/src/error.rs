//! Error types for the remote document store crate.

use thiserror::Error;

use recordsync_core::errors::Error as CoreError;

/// Result type alias for remote store operations.
pub type Result<T> = std::result::Result<T, FirestoreError>;

/// Errors that can occur while talking to the document store.
#[derive(Debug, Error)]
pub enum FirestoreError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the document store
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (missing id, bad project, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A typed document value could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The store is unreachable (offline switch of the in-memory store)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl FirestoreError {
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

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

impl From<FirestoreError> for CoreError {
    fn from(err: FirestoreError) -> Self {
        match err {
            FirestoreError::Http(e) if e.is_timeout() => CoreError::Timeout(0),
            FirestoreError::Http(e) => CoreError::Transport(e.to_string()),
            FirestoreError::Json(e) => CoreError::Parse(e.to_string()),
            FirestoreError::Api { status, message } => CoreError::Api { status, message },
            FirestoreError::InvalidRequest(message) => CoreError::InvalidRequest(message),
            FirestoreError::Decode(message) => CoreError::Parse(message),
            FirestoreError::Unavailable(message) => CoreError::Transport(message),
        }
    }
}
