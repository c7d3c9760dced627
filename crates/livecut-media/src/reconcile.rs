//! Timeline reconciliation.
//!
//! Capture writes one raw segment per (re)connection. Reconciliation turns
//! that directory into a single merged file:
//!
//! 1. Drop raw segments below the size threshold (empty or corrupt).
//! 2. Rewrap each survivor into MPEG-TS and probe its duration. A segment
//!    that fails either step is logged and left out.
//! 3. Order the probed segments by the start time encoded in their names.
//! 4. Concatenate them, in that order, into the merged file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use metrics::counter;
use tokio::fs;
use tracing::{debug, info, warn};

use livecut_models::naming::{CONVERTED_SEGMENT_EXTENSION, RAW_SEGMENT_EXTENSION};
use livecut_models::{parse_segment_start, Segment, Timeline};

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::list_files_with_extension;
use crate::toolchain::MediaToolchain;

pub const SEGMENTS_CONVERTED_TOTAL: &str = "livecut_segments_converted_total";
pub const SEGMENTS_SKIPPED_TOTAL: &str = "livecut_segments_skipped_total";

/// Default minimum raw segment size: 1 MiB.
pub const DEFAULT_MIN_SEGMENT_BYTES: u64 = 1024 * 1024;

/// Reconciliation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Raw segments smaller than this are discarded
    pub min_segment_bytes: u64,
    /// Keep raw segments after a successful conversion
    pub keep_raw: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            min_segment_bytes: DEFAULT_MIN_SEGMENT_BYTES,
            keep_raw: false,
        }
    }
}

/// Result of a successful reconciliation.
#[derive(Debug, Clone)]
pub struct ReconciledTimeline {
    pub timeline: Timeline,
    pub merged_path: PathBuf,
}

/// Stitches a directory of capture segments into one addressable recording.
pub struct TimelineReconciler {
    toolchain: Arc<dyn MediaToolchain>,
    options: ReconcileOptions,
}

impl TimelineReconciler {
    pub fn new(toolchain: Arc<dyn MediaToolchain>, options: ReconcileOptions) -> Self {
        Self { toolchain, options }
    }

    /// Reconcile `record_dir` into `merged_path`.
    ///
    /// Fails with [`MediaError::NoUsableSegments`] when nothing survives
    /// filtering and with [`MediaError::MergeFailed`] when concatenation fails.
    pub async fn reconcile(
        &self,
        record_dir: &Path,
        merged_path: &Path,
    ) -> MediaResult<ReconciledTimeline> {
        let raw_files = list_files_with_extension(record_dir, RAW_SEGMENT_EXTENSION).await?;
        info!(
            "Reconciling {} raw segments in {}",
            raw_files.len(),
            record_dir.display()
        );

        let mut segments = Vec::with_capacity(raw_files.len());
        for raw in &raw_files {
            if let Some(segment) = self.prepare_segment(raw).await? {
                segments.push(segment);
            }
        }

        let timeline = Timeline::new(segments);
        if timeline.is_empty() {
            return Err(MediaError::NoUsableSegments(record_dir.to_path_buf()));
        }

        if let Some(parent) = merged_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let ordered: Vec<PathBuf> = timeline.segments().iter().map(|s| s.path.clone()).collect();
        self.toolchain
            .concat(&ordered, merged_path)
            .await
            .map_err(|e| MediaError::merge_failed(merged_path, e.to_string()))?;

        info!(
            segments = timeline.len(),
            total_secs = timeline.total_duration(),
            "Merged recording written to {}",
            merged_path.display()
        );

        Ok(ReconciledTimeline {
            timeline,
            merged_path: merged_path.to_path_buf(),
        })
    }

    /// Filter, convert and probe one raw segment. `None` means skipped.
    async fn prepare_segment(&self, raw: &Path) -> MediaResult<Option<Segment>> {
        let size = match fs::metadata(raw).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!("Skipping unreadable segment {}: {}", raw.display(), e);
                counter!(SEGMENTS_SKIPPED_TOTAL, "reason" => "unreadable").increment(1);
                return Ok(None);
            }
        };
        if size < self.options.min_segment_bytes {
            debug!("Skipping undersized segment {} ({} bytes)", raw.display(), size);
            counter!(SEGMENTS_SKIPPED_TOTAL, "reason" => "undersized").increment(1);
            return Ok(None);
        }

        let file_name = raw
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let start_time = match parse_segment_start(&file_name) {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping segment with unparseable name: {}", e);
                counter!(SEGMENTS_SKIPPED_TOTAL, "reason" => "name").increment(1);
                return Ok(None);
            }
        };

        let converted = raw.with_extension(CONVERTED_SEGMENT_EXTENSION);
        if let Err(e) = self.toolchain.convert_container(raw, &converted).await {
            let fault = MediaError::transcode_failed(raw, e.to_string());
            warn!("{}; segment excluded from timeline", fault);
            counter!(SEGMENTS_SKIPPED_TOTAL, "reason" => "transcode").increment(1);
            return Ok(None);
        }

        if !self.options.keep_raw {
            if let Err(e) = fs::remove_file(raw).await {
                warn!("Failed to remove raw segment {}: {}", raw.display(), e);
            }
        }

        let duration = match self.toolchain.probe_duration(&converted).await {
            Ok(d) => d,
            Err(e) => {
                let fault = MediaError::transcode_failed(&converted, e.to_string());
                warn!("{}; segment excluded from timeline", fault);
                counter!(SEGMENTS_SKIPPED_TOTAL, "reason" => "probe").increment(1);
                return Ok(None);
            }
        };

        counter!(SEGMENTS_CONVERTED_TOTAL).increment(1);
        Ok(Some(Segment::new(converted, start_time, duration)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Toolchain that writes placeholder files and reports fixed durations.
    #[derive(Default)]
    struct FakeToolchain {
        durations: HashMap<String, f64>,
        fail_convert: Vec<String>,
        fail_concat: bool,
        concatenated: Mutex<Vec<PathBuf>>,
    }

    fn stem(path: &Path) -> String {
        path.file_stem().unwrap().to_string_lossy().to_string()
    }

    #[async_trait]
    impl MediaToolchain for FakeToolchain {
        async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
            self.durations
                .get(&stem(path))
                .copied()
                .ok_or_else(|| MediaError::InvalidVideo(stem(path)))
        }

        async fn convert_container(&self, input: &Path, output: &Path) -> MediaResult<()> {
            if self.fail_convert.contains(&stem(input)) {
                return Err(MediaError::ffmpeg_failed("boom", None, Some(1)));
            }
            fs::write(output, b"ts").await?;
            Ok(())
        }

        async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
            if self.fail_concat {
                return Err(MediaError::ffmpeg_failed("concat", None, Some(1)));
            }
            *self.concatenated.lock().unwrap() = inputs.to_vec();
            fs::write(output, b"merged").await?;
            Ok(())
        }

        async fn trim(&self, _: &Path, _: &Path, _: f64, _: f64) -> MediaResult<()> {
            Ok(())
        }
    }

    const SMALL: u64 = 16;

    async fn write_segment(dir: &Path, name: &str, bytes: usize) {
        fs::write(dir.join(name), vec![0u8; bytes]).await.unwrap();
    }

    fn options(keep_raw: bool) -> ReconcileOptions {
        ReconcileOptions {
            min_segment_bytes: SMALL,
            keep_raw,
        }
    }

    #[tokio::test]
    async fn test_orders_by_encoded_start_time() {
        let dir = TempDir::new().unwrap();
        // Lexical name order differs from start-time order.
        write_segment(dir.path(), "10_2024-01-01_21-00-00.flv", 64).await;
        write_segment(dir.path(), "7_2024-01-01_20-00-00_b.flv", 64).await;
        write_segment(dir.path(), "8_2024-01-01_09-00-00.flv", 64).await;

        let toolchain = Arc::new(FakeToolchain {
            durations: HashMap::from([
                ("10_2024-01-01_21-00-00".to_string(), 10.0),
                ("7_2024-01-01_20-00-00_b".to_string(), 20.0),
                ("8_2024-01-01_09-00-00".to_string(), 30.0),
            ]),
            ..Default::default()
        });
        let reconciler = TimelineReconciler::new(toolchain.clone(), options(true));

        let merged = dir.path().join("out").join("merged.mp4");
        let result = reconciler.reconcile(dir.path(), &merged).await.unwrap();

        let order: Vec<String> = toolchain
            .concatenated
            .lock()
            .unwrap()
            .iter()
            .map(|p| stem(p))
            .collect();
        assert_eq!(
            order,
            vec![
                "8_2024-01-01_09-00-00",
                "7_2024-01-01_20-00-00_b",
                "10_2024-01-01_21-00-00"
            ]
        );
        assert_eq!(result.timeline.len(), 3);
        assert!((result.timeline.total_duration() - 60.0).abs() < 1e-9);
        assert!(merged.exists());
    }

    #[tokio::test]
    async fn test_undersized_and_failed_segments_are_excluded() {
        let dir = TempDir::new().unwrap();
        write_segment(dir.path(), "7_2024-01-01_20-00-00.flv", 64).await;
        write_segment(dir.path(), "7_2024-01-01_20-10-00.flv", 4).await;
        write_segment(dir.path(), "7_2024-01-01_20-20-00.flv", 64).await;
        write_segment(dir.path(), "notes.flv", 64).await;

        let toolchain = Arc::new(FakeToolchain {
            durations: HashMap::from([
                ("7_2024-01-01_20-00-00".to_string(), 5.0),
                ("7_2024-01-01_20-10-00".to_string(), 5.0),
                ("7_2024-01-01_20-20-00".to_string(), 5.0),
            ]),
            fail_convert: vec!["7_2024-01-01_20-20-00".to_string()],
            ..Default::default()
        });
        let reconciler = TimelineReconciler::new(toolchain, options(true));

        let result = reconciler
            .reconcile(dir.path(), &dir.path().join("m.mp4"))
            .await
            .unwrap();
        let kept: Vec<String> = result.timeline.segments().iter().map(|s| stem(&s.path)).collect();
        assert_eq!(kept, vec!["7_2024-01-01_20-00-00"]);
    }

    #[tokio::test]
    async fn test_vanished_segment_is_skipped() {
        let dir = TempDir::new().unwrap();
        let reconciler =
            TimelineReconciler::new(Arc::new(FakeToolchain::default()), options(true));

        let gone = dir.path().join("7_2024-01-01_20-00-00.flv");
        assert!(reconciler.prepare_segment(&gone).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_raw_segments_removed_unless_kept() {
        let dir = TempDir::new().unwrap();
        write_segment(dir.path(), "7_2024-01-01_20-00-00.flv", 64).await;
        let toolchain = Arc::new(FakeToolchain {
            durations: HashMap::from([("7_2024-01-01_20-00-00".to_string(), 5.0)]),
            ..Default::default()
        });

        TimelineReconciler::new(toolchain, options(false))
            .reconcile(dir.path(), &dir.path().join("m.mp4"))
            .await
            .unwrap();

        assert!(!dir.path().join("7_2024-01-01_20-00-00.flv").exists());
        assert!(dir.path().join("7_2024-01-01_20-00-00.ts").exists());
    }

    #[tokio::test]
    async fn test_no_usable_segments() {
        let dir = TempDir::new().unwrap();
        write_segment(dir.path(), "7_2024-01-01_20-00-00.flv", 1).await;
        let reconciler =
            TimelineReconciler::new(Arc::new(FakeToolchain::default()), options(true));

        let err = reconciler
            .reconcile(dir.path(), &dir.path().join("m.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NoUsableSegments(_)));
    }

    #[tokio::test]
    async fn test_concat_failure_is_merge_fault() {
        let dir = TempDir::new().unwrap();
        write_segment(dir.path(), "7_2024-01-01_20-00-00.flv", 64).await;
        let toolchain = Arc::new(FakeToolchain {
            durations: HashMap::from([("7_2024-01-01_20-00-00".to_string(), 5.0)]),
            fail_concat: true,
            ..Default::default()
        });

        let err = TimelineReconciler::new(toolchain, options(true))
            .reconcile(dir.path(), &dir.path().join("m.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::MergeFailed { .. }));
    }
}
