//! Fake collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;

use livecut_media::{MediaError, MediaResult, MediaToolchain};
use livecut_models::naming::segment_file_name;
use livecut_models::SessionContext;
use livecut_platform::{LiveStatusSource, PlatformResult, RoomInfo, VisibilityChecker};
use livecut_recorder::{
    CaptureKind, CaptureTask, PublicationMetadata, PublicationService, RecorderConfig,
    RecorderResult, VideoPart,
};
use livecut_storage::{BackupStorage, StorageResult};

/// Parse a single-room configuration.
pub fn room_config(json: &str) -> livecut_recorder::config::RoomConfig {
    RecorderConfig::from_json(json).unwrap().rooms.remove(0)
}

/// Poll `condition` until it holds, panicking after `timeout`.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Answers live checks from a script, then reports offline forever.
pub struct ScriptedLive {
    answers: Mutex<VecDeque<bool>>,
    pub checks: AtomicUsize,
}

impl ScriptedLive {
    pub fn new(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            checks: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LiveStatusSource for ScriptedLive {
    async fn is_live(&self) -> PlatformResult<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(false))
    }

    async fn room_info(&self) -> PlatformResult<RoomInfo> {
        Ok(RoomInfo {
            display_name: "Evening Stream".to_string(),
        })
    }
}

/// Writes `count` segments of `bytes` bytes, `spacing` apart, then stops.
pub struct SegmentCapture {
    pub count: usize,
    pub spacing_secs: i64,
    pub bytes: usize,
}

#[async_trait]
impl CaptureTask for SegmentCapture {
    fn kind(&self) -> CaptureKind {
        CaptureKind::Video
    }

    async fn run(&self, ctx: &SessionContext) -> RecorderResult<()> {
        for i in 0..self.count {
            let at = ctx.started_at + ChronoDuration::seconds(i as i64 * self.spacing_secs);
            let path = ctx.paths.record_dir.join(segment_file_name(&ctx.room_id, &at));
            tokio::fs::write(path, vec![0u8; self.bytes]).await?;
        }
        Ok(())
    }
}

/// Runs `inner` after the next scripted delay; later runs have none.
pub struct DelayedCapture {
    pub inner: Arc<dyn CaptureTask>,
    pub delays: Mutex<VecDeque<Duration>>,
}

impl DelayedCapture {
    pub fn new(inner: Arc<dyn CaptureTask>, delays: &[Duration]) -> Self {
        Self {
            inner,
            delays: Mutex::new(delays.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl CaptureTask for DelayedCapture {
    fn kind(&self) -> CaptureKind {
        self.inner.kind()
    }

    async fn run(&self, ctx: &SessionContext) -> RecorderResult<()> {
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.run(ctx).await
    }
}

/// Writes `counts[i]` chat lines into minute `i` of the session.
pub struct ChatCapture {
    pub counts: Vec<usize>,
}

#[async_trait]
impl CaptureTask for ChatCapture {
    fn kind(&self) -> CaptureKind {
        CaptureKind::Chat
    }

    async fn run(&self, ctx: &SessionContext) -> RecorderResult<()> {
        // Segment names keep whole seconds; so does the bucket anchor.
        let base = ctx.started_at.timestamp();
        let mut lines = String::new();
        for (minute, &count) in self.counts.iter().enumerate() {
            for j in 0..count {
                let ms = (base + minute as i64 * 60 + j as i64) * 1000;
                lines.push_str(&format!(
                    "{{\"text\":\"hype moment\",\"properties\":{{\"time\":{}}}}}\n",
                    ms
                ));
            }
        }
        tokio::fs::write(ctx.paths.danmu_dir.join("danmu.jsonl"), lines).await?;
        Ok(())
    }
}

/// Toolchain that writes placeholder files and reports fixed durations.
pub struct FakeToolchain {
    pub segment_secs: f64,
    pub merged_secs: f64,
    pub fail_concat: bool,
    /// Extra time taken by the first concat only
    pub first_concat_delay: Option<Duration>,
    pub concat_calls: AtomicUsize,
    pub trims: Mutex<Vec<(PathBuf, f64, f64)>>,
}

impl FakeToolchain {
    pub fn new(segment_secs: f64, merged_secs: f64) -> Self {
        Self {
            segment_secs,
            merged_secs,
            fail_concat: false,
            first_concat_delay: None,
            concat_calls: AtomicUsize::new(0),
            trims: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_concat() -> Self {
        Self {
            fail_concat: true,
            ..Self::new(600.0, 1200.0)
        }
    }
}

#[async_trait]
impl MediaToolchain for FakeToolchain {
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        let name = path.file_name().unwrap().to_string_lossy();
        if name.ends_with("_merged.mp4") {
            Ok(self.merged_secs)
        } else {
            Ok(self.segment_secs)
        }
    }

    async fn convert_container(&self, _input: &Path, output: &Path) -> MediaResult<()> {
        tokio::fs::write(output, b"ts").await?;
        Ok(())
    }

    async fn concat(&self, _inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
        let call = self.concat_calls.fetch_add(1, Ordering::SeqCst);
        if let (0, Some(delay)) = (call, self.first_concat_delay) {
            tokio::time::sleep(delay).await;
        }
        if self.fail_concat {
            return Err(MediaError::ffmpeg_failed("concat failed", None, Some(1)));
        }
        tokio::fs::write(output, b"merged").await?;
        Ok(())
    }

    async fn trim(&self, _input: &Path, output: &Path, offset: f64, length: f64) -> MediaResult<()> {
        tokio::fs::write(output, vec![0u8; 64]).await?;
        self.trims
            .lock()
            .unwrap()
            .push((output.to_path_buf(), offset, length));
        Ok(())
    }
}

/// Records every publish call and hands out sequential ids.
#[derive(Default)]
pub struct FakePublisher {
    pub published: Mutex<Vec<(String, Vec<VideoPart>)>>,
}

#[async_trait]
impl PublicationService for FakePublisher {
    async fn publish(
        &self,
        parts: &[VideoPart],
        metadata: &PublicationMetadata,
    ) -> RecorderResult<String> {
        let mut published = self.published.lock().unwrap();
        published.push((metadata.title.clone(), parts.to_vec()));
        Ok(format!("BV{:010}", published.len()))
    }

    async fn edit(&self, _public_id: &str, _parts: &[VideoPart]) -> RecorderResult<()> {
        Ok(())
    }
}

/// Everything is visible as soon as it is asked about.
#[derive(Default)]
pub struct AlwaysVisible {
    pub checks: AtomicUsize,
}

#[async_trait]
impl VisibilityChecker for AlwaysVisible {
    async fn is_visible(&self, _public_id: &str) -> PlatformResult<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

#[derive(Default)]
pub struct FakeBackup {
    pub uploads: Mutex<Vec<(PathBuf, String)>>,
}

#[async_trait]
impl BackupStorage for FakeBackup {
    async fn upload(&self, path: &Path, destination: &str) -> StorageResult<String> {
        self.uploads
            .lock()
            .unwrap()
            .push((path.to_path_buf(), destination.to_string()));
        livecut_storage::object_key(path, destination)
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
