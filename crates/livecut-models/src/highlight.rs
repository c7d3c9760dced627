//! Detected highlight windows.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A chat-volume burst in wall-clock time with its top keyword tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightWindow {
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub tags: Vec<String>,
}

impl HighlightWindow {
    pub fn new(start_time: DateTime<Local>, end_time: DateTime<Local>, tags: Vec<String>) -> Self {
        Self {
            start_time,
            end_time,
            tags,
        }
    }

    /// Window length in seconds.
    pub fn duration_secs(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}
