//! Model-level parsing errors.

use thiserror::Error;

/// Result type for model parsing.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while parsing names and records.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Segment filename does not encode a start time: {0}")]
    InvalidSegmentName(String),

    #[error("Malformed chat record: {0}")]
    MalformedChatRecord(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub fn invalid_segment_name(name: impl Into<String>) -> Self {
        Self::InvalidSegmentName(name.into())
    }

    pub fn malformed_chat_record(msg: impl Into<String>) -> Self {
        Self::MalformedChatRecord(msg.into())
    }
}
