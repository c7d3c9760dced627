//! Highlight clip extraction.
//!
//! Planning is pure: each highlight window is mapped through the timeline,
//! padded, clamped to the merged recording and either turned into a
//! [`ClipJob`] or discarded for being too short. Execution then runs the
//! jobs against the toolchain concurrently; one failed trim never affects
//! the others.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use livecut_models::naming::clip_file_name;
use livecut_models::{ClipJob, HighlightWindow, Timeline};

use crate::error::MediaResult;
use crate::toolchain::MediaToolchain;

pub const CLIPS_CREATED_TOTAL: &str = "livecut_clips_created_total";
pub const CLIPS_DISCARDED_TOTAL: &str = "livecut_clips_discarded_total";
pub const CLIPS_FAILED_TOTAL: &str = "livecut_clips_failed_total";

/// Padding and length rules applied to every highlight window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipSettings {
    /// Added to the window start (usually negative)
    pub start_offset: f64,
    /// Added to the window end
    pub end_offset: f64,
    /// Clamped clips shorter than this are dropped
    pub min_length: f64,
}

impl Default for ClipSettings {
    fn default() -> Self {
        Self {
            start_offset: -20.0,
            end_offset: 10.0,
            min_length: 30.0,
        }
    }
}

/// Resolve highlight windows into clamped trim jobs.
///
/// `total_duration` is the length of the merged recording; no job ever
/// starts before zero or ends after it. Output names are unique within the
/// returned list.
pub fn plan_clip_jobs(
    windows: &[HighlightWindow],
    timeline: &Timeline,
    total_duration: f64,
    settings: &ClipSettings,
    outputs_dir: &Path,
    tag: &str,
) -> Vec<ClipJob> {
    let total = total_duration.max(0.0);
    let mut taken = HashSet::new();
    let mut jobs = Vec::new();

    for window in windows {
        let start = (timeline.offset_of(&window.start_time) + settings.start_offset).clamp(0.0, total);
        let end = (timeline.offset_of(&window.end_time) + settings.end_offset).clamp(0.0, total);
        let length = end - start;

        if length < settings.min_length {
            debug!(
                start,
                end,
                "Discarding highlight shorter than {}s",
                settings.min_length
            );
            counter!(CLIPS_DISCARDED_TOTAL).increment(1);
            continue;
        }

        let name = unique_name(
            clip_file_name(tag, start.floor() as u64, &window.tags),
            &mut taken,
        );
        jobs.push(ClipJob::new(outputs_dir.join(name), start, length));
    }

    jobs
}

/// Insert a `-N` counter before the tag hint until `name` is unused.
fn unique_name(name: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.clone()) {
        return name;
    }
    let (head, tail) = name.rsplit_once('_').unwrap_or((name.as_str(), ""));
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}_{}", head, n, tail);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Runs clip jobs against the merged recording.
pub struct ClipExtractor {
    toolchain: Arc<dyn MediaToolchain>,
    max_concurrent: usize,
}

impl ClipExtractor {
    pub fn new(toolchain: Arc<dyn MediaToolchain>, max_concurrent: usize) -> Self {
        Self {
            toolchain,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Trim every job out of `merged`. Returns the outputs that were written.
    pub async fn extract(&self, merged: &Path, jobs: &[ClipJob]) -> MediaResult<Vec<PathBuf>> {
        let mut dirs: Vec<&Path> = jobs.iter().filter_map(|j| j.output_path.parent()).collect();
        dirs.dedup();
        for dir in dirs {
            tokio::fs::create_dir_all(dir).await?;
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let tasks = jobs.iter().map(|job| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                match self
                    .toolchain
                    .trim(merged, &job.output_path, job.offset_seconds, job.length_seconds)
                    .await
                {
                    Ok(()) => {
                        counter!(CLIPS_CREATED_TOTAL).increment(1);
                        Some(job.output_path.clone())
                    }
                    Err(e) => {
                        warn!("Clip {} failed: {}", job.output_path.display(), e);
                        counter!(CLIPS_FAILED_TOTAL).increment(1);
                        None
                    }
                }
            }
        });

        let produced: Vec<PathBuf> = join_all(tasks).await.into_iter().flatten().collect();
        info!("Created {}/{} clips", produced.len(), jobs.len());
        Ok(produced)
    }
}
