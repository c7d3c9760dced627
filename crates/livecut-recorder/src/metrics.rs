//! Prometheus metrics for the recorder.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder.
/// The handle renders the exposition text for `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // Session lifecycle
    pub const SESSIONS_STARTED_TOTAL: &str = "livecut_sessions_started_total";
    pub const SESSIONS_FINISHED_TOTAL: &str = "livecut_sessions_finished_total";
    pub const SESSION_PROCESSING_SECONDS: &str = "livecut_session_processing_seconds";
    pub const STATE_TRANSITIONS_TOTAL: &str = "livecut_state_transitions_total";

    // Capture and polling
    pub const CAPTURE_LAUNCHES_TOTAL: &str = "livecut_capture_launches_total";
    pub const LIVE_CHECK_FAILURES_TOTAL: &str = "livecut_live_check_failures_total";

    // Detection
    pub const CHAT_RECORDS_SKIPPED_TOTAL: &str = "livecut_chat_records_skipped_total";
    pub const HIGHLIGHTS_DETECTED_TOTAL: &str = "livecut_highlights_detected_total";

    // Publishing
    pub const PUBLICATIONS_TOTAL: &str = "livecut_publications_total";
    pub const BACKUP_UPLOADS_TOTAL: &str = "livecut_backup_uploads_total";
    pub const ARTIFACTS_RECLAIMED_TOTAL: &str = "livecut_artifacts_reclaimed_total";
}

pub fn record_session_started(room_id: &str) {
    counter!(names::SESSIONS_STARTED_TOTAL, "room" => room_id.to_string()).increment(1);
}

/// `outcome` is `completed` or the failing error kind.
pub fn record_session_finished(room_id: &str, outcome: &str, processing_secs: f64) {
    let labels = [
        ("room", room_id.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::SESSIONS_FINISHED_TOTAL, &labels).increment(1);
    histogram!(names::SESSION_PROCESSING_SECONDS, "room" => room_id.to_string())
        .record(processing_secs);
}

pub fn record_state_transition(room_id: &str, state: &str) {
    let labels = [("room", room_id.to_string()), ("state", state.to_string())];
    counter!(names::STATE_TRANSITIONS_TOTAL, &labels).increment(1);
}

pub fn record_capture_launch(room_id: &str, kind: &str) {
    let labels = [("room", room_id.to_string()), ("kind", kind.to_string())];
    counter!(names::CAPTURE_LAUNCHES_TOTAL, &labels).increment(1);
}

pub fn record_live_check_failure(room_id: &str) {
    counter!(names::LIVE_CHECK_FAILURES_TOTAL, "room" => room_id.to_string()).increment(1);
}

pub fn record_chat_records_skipped(count: u64) {
    counter!(names::CHAT_RECORDS_SKIPPED_TOTAL).increment(count);
}

pub fn record_highlights_detected(room_id: &str, count: usize) {
    counter!(names::HIGHLIGHTS_DETECTED_TOTAL, "room" => room_id.to_string())
        .increment(count as u64);
}

pub fn record_publication(kind: &str, success: bool) {
    let labels = [
        ("kind", kind.to_string()),
        ("outcome", outcome_label(success).to_string()),
    ];
    counter!(names::PUBLICATIONS_TOTAL, &labels).increment(1);
}

pub fn record_backup_upload(success: bool) {
    counter!(names::BACKUP_UPLOADS_TOTAL, "outcome" => outcome_label(success)).increment(1);
}

pub fn record_artifact_reclaimed() {
    counter!(names::ARTIFACTS_RECLAIMED_TOTAL).increment(1);
}

fn outcome_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}
