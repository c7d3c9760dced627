//! The media toolchain seam.
//!
//! Every encode/mux operation the pipeline needs goes through
//! [`MediaToolchain`], so reconciliation and clipping can be driven by a
//! fake in tests and by FFmpeg in production.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::probe_duration;

/// Opaque media operations used by the session pipeline.
#[async_trait]
pub trait MediaToolchain: Send + Sync {
    /// Measured duration of a media file, in seconds.
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;

    /// Rewrap a capture segment into a concatenable container.
    async fn convert_container(&self, input: &Path, output: &Path) -> MediaResult<()>;

    /// Concatenate `inputs`, in order, into `output`.
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()>;

    /// Cut `length` seconds starting at `offset` out of `input`.
    async fn trim(&self, input: &Path, output: &Path, offset: f64, length: f64) -> MediaResult<()>;
}

/// [`MediaToolchain`] backed by the `ffmpeg`/`ffprobe` binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegToolchain {
    runner: FfmpegRunner,
}

impl FfmpegToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any FFmpeg invocation running longer than `secs`.
    pub fn with_timeout(secs: u64) -> Self {
        Self {
            runner: FfmpegRunner::new().with_timeout(secs),
        }
    }
}

#[async_trait]
impl MediaToolchain for FfmpegToolchain {
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        probe_duration(path).await
    }

    async fn convert_container(&self, input: &Path, output: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(input, output)
            .input_args(["-fflags", "+discardcorrupt"])
            .codec_copy()
            .video_bitstream_filter("h264_mp4toannexb")
            .output_format("mpegts");
        self.runner.run("convert", &cmd).await
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
        let list_path = output.with_extension("concat.txt");
        fs::write(&list_path, concat_list(inputs)).await?;
        debug!("Wrote concat list with {} entries: {}", inputs.len(), list_path.display());

        let cmd = FfmpegCommand::new(&list_path, output)
            .input_args(["-f", "concat", "-safe", "0"])
            .codec_copy()
            .output_args(["-fflags", "+igndts", "-avoid_negative_ts", "make_zero"]);
        let result = self.runner.run("concat", &cmd).await;

        if result.is_ok() {
            let _ = fs::remove_file(&list_path).await;
        }
        result
    }

    async fn trim(&self, input: &Path, output: &Path, offset: f64, length: f64) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(input, output)
            .seek(offset)
            .duration(length)
            .input_arg("-accurate_seek")
            .codec_copy()
            .output_args(["-avoid_negative_ts", "1"]);
        self.runner.run("trim", &cmd).await
    }
}

/// Body of an FFmpeg concat-demuxer list file.
fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|path| {
            let absolute = std::path::absolute(path).unwrap_or_else(|_| path.clone());
            let escaped = absolute.to_string_lossy().replace('\'', "'\\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}
