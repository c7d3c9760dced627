//! Media processing for recorded sessions.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with timeouts
//! - FFprobe duration lookup
//! - The [`MediaToolchain`] seam and its FFmpeg implementation
//! - Timeline reconciliation of capture segments into one merged file
//! - Highlight clip planning/extraction and fixed-interval splitting

pub mod command;
pub mod error;
pub mod extract;
pub mod fs_utils;
pub mod probe;
pub mod reconcile;
pub mod split;
pub mod toolchain;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use extract::{plan_clip_jobs, ClipExtractor, ClipSettings};
pub use fs_utils::remove_dir_with_files;
pub use probe::probe_duration;
pub use reconcile::{ReconcileOptions, ReconciledTimeline, TimelineReconciler};
pub use split::{plan_chunks, Splitter};
pub use toolchain::{FfmpegToolchain, MediaToolchain};
