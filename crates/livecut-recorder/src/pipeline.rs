//! Post-capture processing of one session.
//!
//! Reconcile the captured segments into one merged recording, detect chat
//! bursts, cut highlight clips and split the recording into upload-sized
//! chunks. Only reconciliation failures abort the session; detection,
//! clipping and splitting failures are logged and leave their outputs
//! empty.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use livecut_media::{
    plan_clip_jobs, remove_dir_with_files, ClipExtractor, ClipSettings, MediaToolchain,
    ReconcileOptions, Splitter, TimelineReconciler,
};
use livecut_models::{HighlightWindow, SessionContext, Timeline};

use crate::config::RoomConfig;
use crate::detector::{load_chat_events, DetectorSettings, HighlightDetector, DANMU_LOG, SUPERCHAT_LOG};
use crate::error::RecorderResult;
use crate::logging::SessionLogger;
use crate::metrics;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub reconcile: ReconcileOptions,
    pub detector: DetectorSettings,
    /// Highlight clipping; disabled when `None`
    pub clipper: Option<ClipSettings>,
    /// Chunk length for record uploads; no splitting when `None`
    pub split_interval: Option<f64>,
    pub max_clip_jobs: usize,
}

impl PipelineSettings {
    pub fn for_room(room: &RoomConfig, max_clip_jobs: usize) -> Self {
        Self {
            reconcile: room.recorder.reconcile_options(),
            detector: room.parser.clone().into(),
            clipper: room
                .clipper
                .enable_clipper
                .then(|| room.clipper.settings()),
            split_interval: room
                .uploader
                .record
                .upload_record
                .then_some(room.uploader.record.split_interval as f64),
            max_clip_jobs,
        }
    }
}

/// Everything a finished session produced.
#[derive(Debug, Clone, Default)]
pub struct SessionOutputs {
    pub merged: PathBuf,
    pub timeline: Timeline,
    /// Probed length of the merged recording in seconds
    pub total_duration: f64,
    pub windows: Vec<HighlightWindow>,
    pub clips: Vec<PathBuf>,
    pub splits: Vec<PathBuf>,
    /// Chat logs present in the session's chat directory
    pub chat_logs: Vec<PathBuf>,
}

pub struct SessionPipeline {
    toolchain: Arc<dyn MediaToolchain>,
    settings: PipelineSettings,
}

impl SessionPipeline {
    pub fn new(toolchain: Arc<dyn MediaToolchain>, settings: PipelineSettings) -> Self {
        Self {
            toolchain,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn run(&self, ctx: &SessionContext) -> RecorderResult<SessionOutputs> {
        let logger = SessionLogger::for_context(ctx);
        let paths = &ctx.paths;

        let reconciler = TimelineReconciler::new(Arc::clone(&self.toolchain), self.settings.reconcile);
        let reconciled = reconciler
            .reconcile(&paths.record_dir, &paths.merged_file)
            .await?;
        let timeline = reconciled.timeline;
        logger.log_progress(&format!(
            "Reconciled {} segments, live for {:.0}s",
            timeline.len(),
            timeline.live_duration()
        ));

        if !self.settings.reconcile.keep_raw {
            if let Err(e) = remove_dir_with_files(&paths.record_dir).await {
                logger.log_warning(&format!("Failed to remove record directory: {}", e));
            }
        }

        let total_duration = match self.toolchain.probe_duration(&reconciled.merged_path).await {
            Ok(duration) => duration,
            Err(e) => {
                logger.log_warning(&format!(
                    "Probing merged recording failed, using timeline length: {}",
                    e
                ));
                timeline.total_duration()
            }
        };

        let mut outputs = SessionOutputs {
            merged: reconciled.merged_path,
            total_duration,
            chat_logs: existing_chat_logs(ctx).await,
            ..Default::default()
        };

        if let Some(clip_settings) = &self.settings.clipper {
            let (windows, clips) = self
                .highlights(ctx, &timeline, &outputs.merged, total_duration, clip_settings)
                .await;
            outputs.windows = windows;
            outputs.clips = clips;
        }

        if let Some(interval) = self.settings.split_interval {
            let splitter = Splitter::new(Arc::clone(&self.toolchain));
            match splitter
                .split(&outputs.merged, total_duration, interval, &paths.splits_dir, &ctx.tag)
                .await
            {
                Ok(splits) => outputs.splits = splits,
                Err(e) => logger.log_warning(&format!("Splitting failed: {}", e)),
            }
        }

        outputs.timeline = timeline;
        info!(
            room_id = %ctx.room_id,
            session = %ctx.tag,
            windows = outputs.windows.len(),
            clips = outputs.clips.len(),
            splits = outputs.splits.len(),
            "Session processed"
        );
        Ok(outputs)
    }

    async fn highlights(
        &self,
        ctx: &SessionContext,
        timeline: &Timeline,
        merged: &std::path::Path,
        total_duration: f64,
        clip_settings: &ClipSettings,
    ) -> (Vec<HighlightWindow>, Vec<PathBuf>) {
        let chat = match load_chat_events(&ctx.paths.danmu_dir).await {
            Ok(chat) => chat,
            Err(e) => {
                warn!(session = %ctx.tag, "Chat logs unreadable, skipping highlights: {}", e);
                return (Vec::new(), Vec::new());
            }
        };

        let live_start = timeline.live_start().unwrap_or(ctx.started_at);
        let windows = HighlightDetector::new(self.settings.detector.clone()).detect(live_start, &chat.events);
        metrics::record_highlights_detected(&ctx.room_id, windows.len());
        info!(
            session = %ctx.tag,
            events = chat.events.len(),
            skipped = chat.skipped,
            "Detected {} highlight windows",
            windows.len()
        );

        let jobs = plan_clip_jobs(
            &windows,
            timeline,
            total_duration,
            clip_settings,
            &ctx.paths.outputs_dir,
            &ctx.tag,
        );
        let extractor = ClipExtractor::new(Arc::clone(&self.toolchain), self.settings.max_clip_jobs);
        let clips = match extractor.extract(merged, &jobs).await {
            Ok(clips) => clips,
            Err(e) => {
                warn!(session = %ctx.tag, "Clip extraction failed: {}", e);
                Vec::new()
            }
        };
        (windows, clips)
    }
}

async fn existing_chat_logs(ctx: &SessionContext) -> Vec<PathBuf> {
    let mut logs = Vec::new();
    for name in [DANMU_LOG, SUPERCHAT_LOG] {
        let path = ctx.paths.danmu_dir.join(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            logs.push(path);
        }
    }
    logs
}
