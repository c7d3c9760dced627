//! Reconciled recording timeline.
//!
//! A timeline is the list of probed segments sorted by start time. The
//! merged recording is the concatenation of these segments in that order,
//! so any wall-clock instant can be mapped to an offset into the merged
//! file by walking the segments and accumulating their durations.
//!
//! Gaps between one segment's end and the next one's start are capture
//! interruptions. They take no room in the merged file: an instant inside a
//! gap maps to the offset where the gap would have been.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::segment::Segment;

/// Segments of one session in start-time order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    segments: Vec<Segment>,
}

impl Timeline {
    /// Build a timeline, sorting segments by start time.
    ///
    /// The sort is stable, so segments sharing a start time keep their
    /// relative input order.
    pub fn new(mut segments: Vec<Segment>) -> Self {
        segments.sort_by_key(|s| s.start_time);
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Start of the session: the first segment's start time.
    pub fn live_start(&self) -> Option<DateTime<Local>> {
        self.segments.first().map(|s| s.start_time)
    }

    /// Wall-clock span of the session, gaps included, in seconds.
    pub fn live_duration(&self) -> f64 {
        match (self.segments.first(), self.segments.last()) {
            (Some(first), Some(last)) => first.seconds_until(&last.start_time) + last.duration,
            _ => 0.0,
        }
    }

    /// Summed duration of all segments, i.e. the length of the merged file.
    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }

    /// Map a wall-clock instant to an offset (seconds) in the merged file.
    ///
    /// Monotonic non-decreasing in `point` and never above
    /// [`total_duration`](Self::total_duration).
    pub fn offset_of(&self, point: &DateTime<Local>) -> f64 {
        let mut elapsed = 0.0;
        for segment in &self.segments {
            let into = segment.seconds_until(point);
            if into < 0.0 {
                return elapsed;
            }
            if into <= segment.duration {
                return elapsed + into;
            }
            elapsed += segment.duration;
        }
        elapsed
    }
}
