//! Session lifecycle state and the immutable per-session context.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::naming::{session_tag, SessionPaths};

/// Lifecycle state of one room's controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Watching for the room to go live
    #[default]
    Waiting,
    /// Video and chat capture running
    Recording,
    /// Reconciling, detecting highlights, cutting clips
    Processing,
    /// Publishing to the broadcast platform
    PublishingPrimary,
    /// Uploading to backup storage
    PublishingBackup,
}

/// Operator-facing labels, one per state.
const STATE_LABELS: &[(SessionState, &str)] = &[
    (SessionState::Waiting, "Waiting for live"),
    (SessionState::Recording, "Recording"),
    (SessionState::Processing, "Processing records"),
    (SessionState::PublishingPrimary, "Publishing"),
    (SessionState::PublishingBackup, "Uploading backup"),
];

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Waiting => "waiting",
            SessionState::Recording => "recording",
            SessionState::Processing => "processing",
            SessionState::PublishingPrimary => "publishing_primary",
            SessionState::PublishingBackup => "publishing_backup",
        }
    }

    /// Human-readable label from the label table.
    pub fn label(&self) -> &'static str {
        STATE_LABELS
            .iter()
            .find(|(state, _)| state == self)
            .map(|(_, label)| *label)
            .unwrap_or("Unknown")
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A state together with the instant it was entered.
///
/// Always replaced as a whole so readers never see a timestamp that belongs
/// to a different state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub changed_at: DateTime<Utc>,
}

impl SessionStatus {
    pub fn new(state: SessionState) -> Self {
        Self {
            state,
            changed_at: Utc::now(),
        }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new(SessionState::Waiting)
    }
}

/// Identity of one recording session, shared read-only by every stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub room_id: String,
    pub started_at: DateTime<Local>,
    /// `{room_id}_{YYYY-MM-DD_HH-MM-SS}`
    pub tag: String,
    pub paths: SessionPaths,
}

impl SessionContext {
    pub fn new(room_id: impl Into<String>, started_at: DateTime<Local>, data_root: &Path) -> Self {
        let room_id = room_id.into();
        let tag = session_tag(&room_id, &started_at);
        let paths = SessionPaths::new(data_root, &tag);
        Self {
            room_id,
            started_at,
            tag,
            paths,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_every_state_has_a_label() {
        for state in [
            SessionState::Waiting,
            SessionState::Recording,
            SessionState::Processing,
            SessionState::PublishingPrimary,
            SessionState::PublishingBackup,
        ] {
            assert_ne!(state.label(), "Unknown", "{} has no label", state);
        }
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&SessionState::PublishingBackup).unwrap();
        assert_eq!(json, "\"publishing_backup\"");
        assert_eq!(SessionStatus::default().state, SessionState::Waiting);
    }

    #[test]
    fn test_context_derives_tag_and_paths() {
        let at = Local.with_ymd_and_hms(2024, 6, 1, 19, 30, 0).unwrap();
        let ctx = SessionContext::new("9001", at, Path::new("/data-root"));
        assert_eq!(ctx.tag, "9001_2024-06-01_19-30-00");
        assert!(ctx.paths.record_dir.ends_with("records/9001_2024-06-01_19-30-00"));
    }
}
