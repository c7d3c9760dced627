//! Per-room session state machine.
//!
//! ```text
//! WAITING --live--> RECORDING --captures done--> PROCESSING
//!    ^                                               |
//!    |                                   PUBLISHING_PRIMARY (if uploading)
//!    |                                               |
//!    |                                   PUBLISHING_BACKUP (if backing up)
//!    +------------- finished or failed --------------+
//! ```
//!
//! The controller is the only writer of its room's status. Post-capture work
//! runs as a separate task and asks the controller for state changes over a
//! channel, so the room is polled again as soon as capture ends. Requests
//! from a session that has been overtaken by a newer recording are ignored.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn, Instrument};

use livecut_media::MediaToolchain;
use livecut_models::{SessionContext, SessionState, SessionStatus};
use livecut_platform::{LiveStatusSource, VisibilityChecker};
use livecut_storage::BackupStorage;

use crate::capture::{self, CaptureReport, CaptureTask};
use crate::error::{RecorderError, RecorderResult};
use crate::logging::SessionLogger;
use crate::metrics;
use crate::pipeline::{PipelineSettings, SessionPipeline};
use crate::publish::Publisher;
use crate::retry::FailureStreak;
use crate::status::RoomStatusHandle;
use crate::watcher::PublicationWatcher;

/// Consecutive failed live checks logged before going quiet.
const LOGGED_LIVE_CHECK_FAILURES: u32 = 3;

/// Writable status of one room. Not `Clone`: one writer per room.
pub struct StatusCell {
    room_id: String,
    status: watch::Sender<SessionStatus>,
    live: watch::Sender<bool>,
}

impl StatusCell {
    pub fn new(room_id: impl Into<String>) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        let (live, _) = watch::channel(false);
        Self {
            room_id: room_id.into(),
            status,
            live,
        }
    }

    pub fn handle(&self) -> RoomStatusHandle {
        RoomStatusHandle::new(self.room_id.clone(), self.status.subscribe(), self.live.subscribe())
    }

    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    /// Replace state and timestamp in one step.
    pub fn transition(&self, state: SessionState) {
        let previous = self.status.send_replace(SessionStatus::new(state));
        if previous.state != state {
            info!(room_id = %self.room_id, from = %previous.state, to = %state, "State changed");
            metrics::record_state_transition(&self.room_id, state.as_str());
        }
    }

    pub fn set_live(&self, live: bool) {
        self.live.send_if_modified(|current| {
            let changed = *current != live;
            *current = live;
            changed
        });
    }
}

/// External collaborators of one room.
#[derive(Clone)]
pub struct RoomServices {
    pub live: Arc<dyn LiveStatusSource>,
    pub video_capture: Arc<dyn CaptureTask>,
    pub chat_capture: Arc<dyn CaptureTask>,
    pub toolchain: Arc<dyn MediaToolchain>,
    /// Absent when nothing is uploaded
    pub publisher: Option<Arc<Publisher>>,
    pub visibility: Arc<dyn VisibilityChecker>,
    /// Present only when this room is backed up
    pub backup: Option<Arc<dyn BackupStorage>>,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub check_interval: Duration,
    pub data_root: PathBuf,
    pub pipeline: PipelineSettings,
    pub backup_prefix: String,
    pub watcher_interval: Duration,
    pub watcher_max_checks: Option<u32>,
}

/// Request from a session's post-capture task.
#[derive(Debug)]
enum SessionEvent {
    State {
        session: String,
        state: SessionState,
    },
    Finished {
        session: String,
        result: RecorderResult<SessionSummary>,
        elapsed: Duration,
    },
}

/// What a finished session left behind.
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub clips: usize,
    pub splits: usize,
    pub published: usize,
    pub watchers: usize,
    pub backed_up: usize,
}

/// A session whose captures are still running.
struct Recording {
    ctx: Arc<SessionContext>,
    display_name: String,
    pending: usize,
}

pub struct SessionController {
    room_id: String,
    services: RoomServices,
    settings: ControllerSettings,
    status: StatusCell,
    shutdown: watch::Receiver<bool>,
}

impl SessionController {
    pub fn new(
        room_id: impl Into<String>,
        services: RoomServices,
        settings: ControllerSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let room_id = room_id.into();
        Self {
            status: StatusCell::new(room_id.clone()),
            room_id,
            services,
            settings,
            shutdown,
        }
    }

    pub fn status_handle(&self) -> RoomStatusHandle {
        self.status.handle()
    }

    /// Drive the room until shutdown.
    pub async fn run(mut self) {
        info!(room_id = %self.room_id, "Watching room every {:?}", self.settings.check_interval);

        let (capture_tx, mut capture_rx) = mpsc::unbounded_channel::<CaptureReport>();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SessionEvent>();
        let mut ticker = tokio::time::interval(self.settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut prev_live = false;
        let mut check_failures = FailureStreak::new(LOGGED_LIVE_CHECK_FAILURES);
        let mut recording: Option<Recording> = None;
        // Session whose post-capture task currently owns the status.
        let mut owner: Option<String> = None;

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!(room_id = %self.room_id, "Controller stopping");
                        break;
                    }
                }
                _ = ticker.tick(), if recording.is_none() => {
                    let live = self.poll_live(&mut check_failures).await;
                    if live && !prev_live {
                        recording = self.start_session(&capture_tx).await;
                        if recording.is_some() {
                            owner = None;
                        }
                    }
                    prev_live = live;
                }
                Some(report) = capture_rx.recv() => {
                    let Some(active) = recording.as_mut() else {
                        debug!("Capture report for finished session {}", report.session);
                        continue;
                    };
                    if report.session != active.ctx.tag {
                        continue;
                    }
                    match &report.result {
                        Ok(()) => info!(session = %report.session, "{} capture finished", report.kind),
                        Err(e) => warn!(session = %report.session, "{} capture failed: {}", report.kind, e),
                    }
                    active.pending = active.pending.saturating_sub(1);
                    if active.pending == 0 {
                        if let Some(done) = recording.take() {
                            owner = Some(done.ctx.tag.clone());
                            prev_live = false;
                            self.status.transition(SessionState::Processing);
                            self.spawn_post_capture(done, event_tx.clone());
                        }
                    }
                }
                Some(event) = event_rx.recv() => {
                    self.apply(event, recording.is_some(), &mut owner);
                }
            }
        }
    }

    async fn poll_live(&self, failures: &mut FailureStreak) -> bool {
        match self.services.live.is_live().await {
            Ok(live) => {
                if let Some(streak) = failures.record_success() {
                    info!(room_id = %self.room_id, "Live check recovered after {} failures", streak);
                }
                self.status.set_live(live);
                live
            }
            Err(e) => {
                metrics::record_live_check_failure(&self.room_id);
                if failures.record_failure() {
                    warn!(room_id = %self.room_id, "Live check failed: {}", e);
                }
                false
            }
        }
    }

    async fn start_session(&self, reports: &mpsc::UnboundedSender<CaptureReport>) -> Option<Recording> {
        let ctx = SessionContext::new(self.room_id.clone(), Local::now(), &self.settings.data_root);
        let logger = SessionLogger::for_context(&ctx);

        for dir in ctx.paths.directories() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                logger.log_error(&format!("Cannot create {}: {}", dir.display(), e));
                return None;
            }
        }

        let display_name = match self.services.live.room_info().await {
            Ok(info) => info.display_name,
            Err(e) => {
                logger.log_warning(&format!("Room info unavailable, using room id: {}", e));
                self.room_id.clone()
            }
        };

        self.status.transition(SessionState::Recording);
        metrics::record_session_started(&self.room_id);
        logger.log_start(&display_name);

        let ctx = Arc::new(ctx);
        let tasks = vec![
            Arc::clone(&self.services.video_capture),
            Arc::clone(&self.services.chat_capture),
        ];
        let pending = capture::launch(Arc::clone(&ctx), tasks, reports.clone());
        Some(Recording {
            ctx,
            display_name,
            pending,
        })
    }

    fn apply(&self, event: SessionEvent, recording: bool, owner: &mut Option<String>) {
        match event {
            SessionEvent::State { session, state } => {
                if !recording && owner.as_deref() == Some(session.as_str()) {
                    self.status.transition(state);
                }
            }
            SessionEvent::Finished {
                session,
                result,
                elapsed,
            } => {
                let logger = SessionLogger::new(&self.room_id, &session);
                let outcome = match &result {
                    Ok(summary) => {
                        logger.log_completion(&format!(
                            "{} clips, {} chunks, {} published, {} watched, {} backed up in {:.0}s",
                            summary.clips,
                            summary.splits,
                            summary.published,
                            summary.watchers,
                            summary.backed_up,
                            elapsed.as_secs_f64()
                        ));
                        "completed"
                    }
                    Err(e) => {
                        logger.log_error(&e.to_string());
                        e.kind()
                    }
                };
                metrics::record_session_finished(&self.room_id, outcome, elapsed.as_secs_f64());

                if !recording && owner.as_deref() == Some(session.as_str()) {
                    *owner = None;
                    self.status.transition(SessionState::Waiting);
                }
            }
        }
    }

    /// Run the post-capture unit. Its final event is always sent, even if
    /// the work panics.
    fn spawn_post_capture(&self, recording: Recording, events: mpsc::UnboundedSender<SessionEvent>) {
        let run = PostCapture {
            ctx: Arc::clone(&recording.ctx),
            display_name: recording.display_name,
            services: self.services.clone(),
            settings: self.settings.clone(),
            events: events.clone(),
            shutdown: self.shutdown.clone(),
        };
        let session = recording.ctx.tag.clone();
        let span = SessionLogger::for_context(&recording.ctx).create_span("post_capture");

        tokio::spawn(
            async move {
                let started = Instant::now();
                let result = match tokio::spawn(run.execute()).await {
                    Ok(result) => result,
                    Err(e) => Err(RecorderError::internal(format!("session task aborted: {}", e))),
                };
                let _ = events.send(SessionEvent::Finished {
                    session,
                    result,
                    elapsed: started.elapsed(),
                });
            }
            .instrument(span),
        );
    }
}

/// Post-capture work of one session.
struct PostCapture {
    ctx: Arc<SessionContext>,
    display_name: String,
    services: RoomServices,
    settings: ControllerSettings,
    events: mpsc::UnboundedSender<SessionEvent>,
    shutdown: watch::Receiver<bool>,
}

impl PostCapture {
    fn request(&self, state: SessionState) {
        let _ = self.events.send(SessionEvent::State {
            session: self.ctx.tag.clone(),
            state,
        });
    }

    async fn execute(self) -> RecorderResult<SessionSummary> {
        let pipeline = SessionPipeline::new(
            Arc::clone(&self.services.toolchain),
            self.settings.pipeline.clone(),
        );
        let outputs = pipeline.run(&self.ctx).await?;

        let mut summary = SessionSummary {
            clips: outputs.clips.len(),
            splits: outputs.splits.len(),
            ..Default::default()
        };

        if let Some(publisher) = self
            .services
            .publisher
            .as_ref()
            .filter(|p| p.has_uploads(&outputs))
        {
            self.request(SessionState::PublishingPrimary);
            let artifacts = publisher
                .publish_session(&self.ctx, &outputs, &self.display_name)
                .await;
            summary.published = artifacts.len();

            for artifact in artifacts.into_iter().filter(|a| a.reclaim) {
                PublicationWatcher::new(
                    artifact.public_id,
                    artifact.source_dir,
                    Arc::clone(&self.services.visibility),
                    self.settings.watcher_interval,
                    self.shutdown.clone(),
                )
                .with_max_checks(self.settings.watcher_max_checks)
                .spawn();
                summary.watchers += 1;
            }
        }

        if let Some(backup) = &self.services.backup {
            self.request(SessionState::PublishingBackup);
            let destination = format!(
                "{}/{}",
                self.settings.backup_prefix.trim_end_matches('/'),
                self.ctx.tag
            );
            let files = std::iter::once(&outputs.merged).chain(outputs.chat_logs.iter());
            for file in files {
                match backup.upload(file, &destination).await {
                    Ok(key) => {
                        metrics::record_backup_upload(true);
                        summary.backed_up += 1;
                        debug!(key = %key, "Backed up {}", file.display());
                    }
                    Err(e) => {
                        metrics::record_backup_upload(false);
                        error!(session = %self.ctx.tag, "Backup of {} failed: {}", file.display(), e);
                    }
                }
            }
        }

        Ok(summary)
    }
}
