//! Video and chat capture.
//!
//! Capture is delegated to external programs. Each stream of a session runs
//! as its own task that relaunches its program for as long as the room is
//! live, and reports exactly once on the session's report channel when it
//! stops, whether it finished, failed or panicked.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument};

use livecut_models::naming::segment_file_name;
use livecut_models::SessionContext;
use livecut_platform::LiveStatusSource;

use crate::config::CaptureCommand;
use crate::detector::DANMU_LOG;
use crate::error::{RecorderError, RecorderResult};
use crate::logging::SessionLogger;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureKind {
    Video,
    Chat,
}

impl CaptureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureKind::Video => "video",
            CaptureKind::Chat => "chat",
        }
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One long-running capture of a session stream.
#[async_trait]
pub trait CaptureTask: Send + Sync {
    fn kind(&self) -> CaptureKind;

    /// Capture until the room goes offline.
    async fn run(&self, ctx: &SessionContext) -> RecorderResult<()>;
}

/// Final word of one capture task.
#[derive(Debug)]
pub struct CaptureReport {
    pub session: String,
    pub kind: CaptureKind,
    pub result: RecorderResult<()>,
}

/// Spawn every task of a session. Each sends one report on `reports`.
pub fn launch(
    ctx: Arc<SessionContext>,
    tasks: Vec<Arc<dyn CaptureTask>>,
    reports: mpsc::UnboundedSender<CaptureReport>,
) -> usize {
    let count = tasks.len();
    for task in tasks {
        let ctx = Arc::clone(&ctx);
        let reports = reports.clone();
        let kind = task.kind();
        let span = SessionLogger::for_context(&ctx).create_span(kind.as_str());

        tokio::spawn(async move {
            metrics::record_capture_launch(&ctx.room_id, kind.as_str());
            let inner_ctx = Arc::clone(&ctx);
            let result = match tokio::spawn(async move { task.run(&inner_ctx).await }).await {
                Ok(result) => result,
                Err(e) => Err(RecorderError::capture(format!("{} capture task aborted: {}", kind, e))),
            };
            let _ = reports.send(CaptureReport {
                session: ctx.tag.clone(),
                kind,
                result,
            });
        }
        .instrument(span));
    }
    count
}

/// Capture for streams that are not configured; finishes at once.
pub struct NoopCapture {
    kind: CaptureKind,
}

impl NoopCapture {
    pub fn new(kind: CaptureKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl CaptureTask for NoopCapture {
    fn kind(&self) -> CaptureKind {
        self.kind
    }

    async fn run(&self, _ctx: &SessionContext) -> RecorderResult<()> {
        debug!("No {} capture configured", self.kind);
        Ok(())
    }
}

/// Capture through an external program.
///
/// Video captures get a fresh segment file per launch, named after the
/// launch time. Chat captures append to the session's chat log.
pub struct CommandCapture {
    kind: CaptureKind,
    command: CaptureCommand,
    live: Arc<dyn LiveStatusSource>,
    poll_interval: Duration,
}

impl CommandCapture {
    pub fn new(
        kind: CaptureKind,
        command: CaptureCommand,
        live: Arc<dyn LiveStatusSource>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            kind,
            command,
            live,
            poll_interval,
        }
    }

    fn output_for(&self, ctx: &SessionContext) -> std::path::PathBuf {
        match self.kind {
            CaptureKind::Video => ctx
                .paths
                .record_dir
                .join(segment_file_name(&ctx.room_id, &Local::now())),
            CaptureKind::Chat => ctx.paths.danmu_dir.join(DANMU_LOG),
        }
    }

    fn build(&self, ctx: &SessionContext, output: &Path) -> Command {
        let output_dir = output.parent().unwrap_or(output);
        let mut cmd = Command::new(&self.command.program);
        for arg in &self.command.args {
            cmd.arg(substitute(arg, ctx, output, output_dir));
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Whether capture should go on; failed checks count as offline.
    async fn still_live(&self) -> bool {
        match self.live.is_live().await {
            Ok(live) => live,
            Err(e) => {
                warn!("Live check failed, stopping {} capture: {}", self.kind, e);
                false
            }
        }
    }
}

fn substitute(arg: &str, ctx: &SessionContext, output: &Path, output_dir: &Path) -> String {
    arg.replace("{room_id}", &ctx.room_id)
        .replace("{output}", &output.to_string_lossy())
        .replace("{output_dir}", &output_dir.to_string_lossy())
        .replace("{danmu_dir}", &ctx.paths.danmu_dir.to_string_lossy())
}

#[async_trait]
impl CaptureTask for CommandCapture {
    fn kind(&self) -> CaptureKind {
        self.kind
    }

    async fn run(&self, ctx: &SessionContext) -> RecorderResult<()> {
        let mut launches = 0u32;
        loop {
            let output = self.output_for(ctx);
            let mut child = self.build(ctx, &output).spawn().map_err(|e| {
                RecorderError::capture(format!(
                    "cannot start {} capture {:?}: {}",
                    self.kind, self.command.program, e
                ))
            })?;
            launches += 1;
            info!("{} capture running (launch {}) -> {}", self.kind, launches, output.display());

            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.tick().await;
            let status = loop {
                tokio::select! {
                    status = child.wait() => break Some(status?),
                    _ = ticker.tick() => {
                        // A failed check while the program runs is ignored.
                        if let Ok(false) = self.live.is_live().await {
                            info!("Room went offline, stopping {} capture", self.kind);
                            let _ = child.kill().await;
                            break None;
                        }
                    }
                }
            };

            let Some(status) = status else {
                return Ok(());
            };
            debug!("{} capture exited with {}", self.kind, status);
            if !self.still_live().await {
                return Ok(());
            }
            warn!(
                "{} capture exited with {} while live, relaunching in {}s",
                self.kind, status, self.command.restart_delay
            );
            tokio::time::sleep(Duration::from_secs(self.command.restart_delay)).await;
        }
    }
}
