//! Resolved trim instructions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A clamped trim of the merged recording, ready for the toolchain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipJob {
    pub output_path: PathBuf,
    /// Start offset into the merged file, in seconds
    pub offset_seconds: f64,
    /// Clip length in seconds
    pub length_seconds: f64,
}

impl ClipJob {
    pub fn new(output_path: impl Into<PathBuf>, offset_seconds: f64, length_seconds: f64) -> Self {
        Self {
            output_path: output_path.into(),
            offset_seconds,
            length_seconds,
        }
    }

    /// End offset into the merged file.
    pub fn end_seconds(&self) -> f64 {
        self.offset_seconds + self.length_seconds
    }
}
