//! Platform client error types.

use thiserror::Error;

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors that can occur talking to the broadcast platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Invalid client configuration: {0}")]
    Config(String),

    #[error("Request failed with HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Platform returned code {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlatformError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            PlatformError::Network(_) => true,
            PlatformError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
