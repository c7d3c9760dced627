//! Capture segment model.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One captured file fragment, after container conversion and probing.
///
/// Segments are immutable once probed: the duration is the measured
/// length of the converted file, the start time comes from its filename.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Path of the converted segment
    pub path: PathBuf,
    /// Wall-clock time the fragment started
    pub start_time: DateTime<Local>,
    /// Measured duration in seconds
    pub duration: f64,
}

impl Segment {
    /// Create a segment. Negative or non-finite durations are stored as zero.
    pub fn new(path: impl Into<PathBuf>, start_time: DateTime<Local>, duration: f64) -> Self {
        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        Self {
            path: path.into(),
            start_time,
            duration,
        }
    }

    /// Wall-clock time the fragment ended.
    pub fn end_time(&self) -> DateTime<Local> {
        self.start_time + chrono::Duration::milliseconds((self.duration * 1000.0).round() as i64)
    }

    /// Seconds from this segment's start to `point` (negative if before).
    pub fn seconds_until(&self, point: &DateTime<Local>) -> f64 {
        (*point - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}
