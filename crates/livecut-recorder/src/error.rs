//! Recorder error types.
//!
//! The session-level faults are explicit variants so the controller and
//! the logs can tell a failed merge from a failed upload without string
//! matching.

use thiserror::Error;

use livecut_media::MediaError;

pub type RecorderResult<T> = Result<T, RecorderError>;

#[derive(Debug, Error)]
pub enum RecorderError {
    /// A capture process died or left no usable segments.
    #[error("Capture fault: {0}")]
    Capture(String),

    /// The toolchain failed on one segment.
    #[error("Transcode fault: {0}")]
    Transcode(String),

    /// Concatenation of the timeline failed.
    #[error("Merge fault: {0}")]
    Merge(String),

    /// A chat log record could not be used.
    #[error("Detection fault: {0}")]
    Detection(String),

    /// Publishing failed after its retries.
    #[error("Publication fault: {0}")]
    Publication(String),

    /// A visibility check failed; always retried.
    #[error("Visibility check fault: {0}")]
    VisibilityCheck(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Media error: {0}")]
    Media(#[source] MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] livecut_storage::StorageError),

    #[error("Platform error: {0}")]
    Platform(#[from] livecut_platform::PlatformError),

    #[error("Model error: {0}")]
    Model(#[from] livecut_models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<MediaError> for RecorderError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::MergeFailed { .. } => Self::Merge(err.to_string()),
            MediaError::NoUsableSegments(_) => Self::Capture(err.to_string()),
            MediaError::TranscodeFailed { .. } => Self::Transcode(err.to_string()),
            other => Self::Media(other),
        }
    }
}

impl RecorderError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    pub fn detection(msg: impl Into<String>) -> Self {
        Self::Detection(msg.into())
    }

    pub fn publication(msg: impl Into<String>) -> Self {
        Self::Publication(msg.into())
    }

    pub fn visibility_check(msg: impl Into<String>) -> Self {
        Self::VisibilityCheck(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RecorderError::Capture(_) => "capture",
            RecorderError::Transcode(_) => "transcode",
            RecorderError::Merge(_) => "merge",
            RecorderError::Detection(_) => "detection",
            RecorderError::Publication(_) => "publication",
            RecorderError::VisibilityCheck(_) => "visibility_check",
            RecorderError::Config(_) => "config",
            RecorderError::Internal(_) => "internal",
            RecorderError::Media(_) => "media",
            RecorderError::Storage(_) => "storage",
            RecorderError::Platform(_) => "platform",
            RecorderError::Model(_) => "model",
            RecorderError::Io(_) => "io",
            RecorderError::Json(_) => "json",
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            RecorderError::Publication(_)
            | RecorderError::VisibilityCheck(_)
            | RecorderError::Storage(_)
            | RecorderError::Io(_) => true,
            RecorderError::Platform(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_media_errors_map_to_session_faults() {
        let merge: RecorderError = MediaError::merge_failed("/m.mp4", "exit 1").into();
        assert!(matches!(merge, RecorderError::Merge(_)));

        let empty: RecorderError = MediaError::NoUsableSegments(PathBuf::from("/rec")).into();
        assert!(matches!(empty, RecorderError::Capture(_)));

        let seg: RecorderError = MediaError::transcode_failed("/a.flv", "bad").into();
        assert!(matches!(seg, RecorderError::Transcode(_)));

        let other: RecorderError = MediaError::FfmpegNotFound.into();
        assert_eq!(other.kind(), "media");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(RecorderError::publication("timeout").is_retryable());
        assert!(RecorderError::visibility_check("503").is_retryable());
        assert!(!RecorderError::Merge("x".into()).is_retryable());
        assert!(!RecorderError::config("x").is_retryable());
    }
}
