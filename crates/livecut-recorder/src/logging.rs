//! Session-scoped logging.
//!
//! Every line logged on behalf of a recording session carries the room id
//! and session tag as structured fields, so JSON logs can be filtered per
//! session without parsing messages.

use tracing::{error, info, warn, Span};

use livecut_models::SessionContext;

/// Crates whose level follows `root.logger.log_level`.
const LOGGED_CRATES: &[&str] = &[
    "livecut_recorder",
    "livecut_media",
    "livecut_platform",
    "livecut_storage",
    "livecut_models",
];

/// Map a configured level name onto a tracing level, defaulting to `info`.
pub fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// `EnvFilter` directives applying `level` to every recorder crate.
pub fn crate_directives(level: &str) -> Vec<String> {
    let level = normalize_level(level);
    LOGGED_CRATES
        .iter()
        .map(|krate| format!("{}={}", krate, level))
        .collect()
}

/// Logger bound to one room and one session.
#[derive(Debug, Clone)]
pub struct SessionLogger {
    room_id: String,
    session: String,
}

impl SessionLogger {
    pub fn new(room_id: &str, session: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            session: session.to_string(),
        }
    }

    pub fn for_context(ctx: &SessionContext) -> Self {
        Self::new(&ctx.room_id, &ctx.tag)
    }

    pub fn log_start(&self, message: &str) {
        info!(room_id = %self.room_id, session = %self.session, "Session started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(room_id = %self.room_id, session = %self.session, "{}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(room_id = %self.room_id, session = %self.session, "{}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(room_id = %self.room_id, session = %self.session, "Session error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(room_id = %self.room_id, session = %self.session, "Session finished: {}", message);
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// Span for work done on behalf of this session.
    pub fn create_span(&self, stage: &str) -> Span {
        tracing::info_span!(
            "session",
            room_id = %self.room_id,
            session = %self.session,
            stage = %stage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(normalize_level("DEBUG"), "debug");
        assert_eq!(normalize_level("warning"), "warn");
        assert_eq!(normalize_level("CRITICAL"), "error");
        assert_eq!(normalize_level("nonsense"), "info");
    }

    #[test]
    fn test_directives_cover_every_crate() {
        let directives = crate_directives("ERROR");
        assert_eq!(directives.len(), LOGGED_CRATES.len());
        assert!(directives.contains(&"livecut_media=error".to_string()));
    }

    #[test]
    fn test_session_logger_fields() {
        let logger = SessionLogger::new("42", "42_2024-01-01_00-00-00");
        assert_eq!(logger.room_id(), "42");
        assert_eq!(logger.session(), "42_2024-01-01_00-00-00");
    }
}
