//! Fixed-interval splitting of the merged recording.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use metrics::counter;
use tokio::fs;
use tracing::{info, warn};

use livecut_models::naming::split_file_name;

use crate::error::MediaResult;
use crate::toolchain::MediaToolchain;

pub const SPLIT_CHUNKS_TOTAL: &str = "livecut_split_chunks_total";
pub const SPLIT_CHUNKS_FAILED_TOTAL: &str = "livecut_split_chunks_failed_total";

/// Remainders shorter than this are float noise, not a chunk.
const MIN_CHUNK_SECS: f64 = 1e-6;

/// `(offset, length)` of each sequential chunk of a `duration`-second file.
///
/// The chunk count is `ceil(duration / interval)`; only the last chunk may
/// be shorter than `interval`. A non-positive interval yields one chunk
/// spanning the whole file.
pub fn plan_chunks(duration: f64, interval: f64) -> Vec<(f64, f64)> {
    if !(duration > 0.0) {
        return Vec::new();
    }
    if !(interval > 0.0) {
        return vec![(0.0, duration)];
    }

    let count = (duration / interval).ceil() as usize;
    (0..count)
        .map(|i| {
            let offset = i as f64 * interval;
            (offset, interval.min(duration - offset))
        })
        .filter(|(_, length)| *length > MIN_CHUNK_SECS)
        .collect()
}

/// Cuts the merged recording into upload-sized chunks.
pub struct Splitter {
    toolchain: Arc<dyn MediaToolchain>,
}

impl Splitter {
    pub fn new(toolchain: Arc<dyn MediaToolchain>) -> Self {
        Self { toolchain }
    }

    /// Split `merged` into `splits_dir`, returning the chunks in order.
    ///
    /// With `interval <= 0` the merged file is copied unchanged as chunk 0.
    /// A chunk that fails to cut is logged and left out; the others are kept.
    pub async fn split(
        &self,
        merged: &Path,
        total_duration: f64,
        interval: f64,
        splits_dir: &Path,
        tag: &str,
    ) -> MediaResult<Vec<PathBuf>> {
        fs::create_dir_all(splits_dir).await?;

        let chunks = plan_chunks(total_duration, interval);
        if chunks.is_empty() {
            info!("Merged recording is empty; nothing to split");
            return Ok(Vec::new());
        }

        let planned = chunks.len();
        let mut outputs = Vec::with_capacity(planned);
        if !(interval > 0.0) {
            let output = splits_dir.join(split_file_name(tag, 0));
            fs::copy(merged, &output).await?;
            outputs.push(output);
        } else {
            for (index, (offset, length)) in chunks.into_iter().enumerate() {
                let output = splits_dir.join(split_file_name(tag, index));
                match self.toolchain.trim(merged, &output, offset, length).await {
                    Ok(()) => outputs.push(output),
                    Err(e) => {
                        warn!("Chunk {} at {:.0}s failed: {}", output.display(), offset, e);
                        counter!(SPLIT_CHUNKS_FAILED_TOTAL).increment(1);
                    }
                }
            }
        }

        counter!(SPLIT_CHUNKS_TOTAL).increment(outputs.len() as u64);
        info!("Split merged recording into {}/{} chunks", outputs.len(), planned);
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn test_ceiling_division() {
        let chunks = plan_chunks(7300.0, 3600.0);
        assert_eq!(chunks, vec![(0.0, 3600.0), (3600.0, 3600.0), (7200.0, 100.0)]);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        assert_eq!(plan_chunks(7200.0, 3600.0).len(), 2);
    }

    #[test]
    fn test_non_positive_interval_is_whole_file() {
        assert_eq!(plan_chunks(50.0, 0.0), vec![(0.0, 50.0)]);
        assert_eq!(plan_chunks(50.0, -1.0), vec![(0.0, 50.0)]);
    }

    #[test]
    fn test_empty_file_has_no_chunks() {
        assert!(plan_chunks(0.0, 3600.0).is_empty());
        assert!(plan_chunks(0.0, 0.0).is_empty());
    }

    #[derive(Default)]
    struct RecordingToolchain {
        trims: Mutex<Vec<(PathBuf, f64, f64)>>,
        /// Trims starting at this offset fail
        fail_at: Option<f64>,
    }

    #[async_trait]
    impl MediaToolchain for RecordingToolchain {
        async fn probe_duration(&self, _: &Path) -> MediaResult<f64> {
            Err(MediaError::internal("unused"))
        }
        async fn convert_container(&self, _: &Path, _: &Path) -> MediaResult<()> {
            Ok(())
        }
        async fn concat(&self, _: &[PathBuf], _: &Path) -> MediaResult<()> {
            Ok(())
        }
        async fn trim(&self, _: &Path, output: &Path, offset: f64, length: f64) -> MediaResult<()> {
            if self.fail_at == Some(offset) {
                return Err(MediaError::ffmpeg_failed("trim failed", None, Some(1)));
            }
            fs::write(output, b"chunk").await?;
            self.trims
                .lock()
                .unwrap()
                .push((output.to_path_buf(), offset, length));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_split_names_chunks_sequentially() {
        let dir = TempDir::new().unwrap();
        let toolchain = Arc::new(RecordingToolchain::default());
        let splitter = Splitter::new(toolchain.clone());

        let outputs = splitter
            .split(&dir.path().join("m.mp4"), 7300.0, 3600.0, dir.path(), "1_t")
            .await
            .unwrap();

        assert_eq!(outputs.len(), 3);
        assert!(outputs[2].ends_with("1_t_0002.mp4"));
        let trims = toolchain.trims.lock().unwrap();
        assert!((trims[2].2 - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_chunk_keeps_the_others() {
        let dir = TempDir::new().unwrap();
        let toolchain = Arc::new(RecordingToolchain {
            fail_at: Some(3600.0),
            ..Default::default()
        });

        let outputs = Splitter::new(toolchain.clone())
            .split(&dir.path().join("m.mp4"), 7300.0, 3600.0, dir.path(), "1_t")
            .await
            .unwrap();

        assert_eq!(outputs.len(), 2);
        assert!(outputs[0].ends_with("1_t_0000.mp4"));
        assert!(outputs[1].ends_with("1_t_0002.mp4"));
        assert!(outputs.iter().all(|p| p.exists()));
        assert!(!dir.path().join("1_t_0001.mp4").exists());
    }

    #[tokio::test]
    async fn test_split_without_interval_copies_file() {
        let dir = TempDir::new().unwrap();
        let merged = dir.path().join("m.mp4");
        fs::write(&merged, b"video").await.unwrap();
        let toolchain = Arc::new(RecordingToolchain::default());

        let outputs = Splitter::new(toolchain.clone())
            .split(&merged, 42.0, 0.0, &dir.path().join("splits"), "1_t")
            .await
            .unwrap();

        assert_eq!(outputs.len(), 1);
        assert_eq!(fs::read(&outputs[0]).await.unwrap(), b"video");
        assert!(toolchain.trims.lock().unwrap().is_empty());
    }
}
