//! Reclaims local storage once a published artifact is publicly visible.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};

use livecut_media::remove_dir_with_files;
use livecut_platform::VisibilityChecker;

use crate::error::RecorderError;
use crate::metrics;
use crate::retry::FailureStreak;

/// Consecutive failed checks logged before going quiet.
const LOGGED_CHECK_FAILURES: u32 = 3;

/// How a watcher ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Visible and the source directory is gone.
    Reclaimed,
    /// Visible, but deleting the source directory failed.
    ReclaimFailed,
    /// `max_checks` ran out before the artifact became visible.
    GaveUp,
    /// Shutdown was requested.
    Cancelled,
}

/// Polls one artifact's visibility.
///
/// Failed checks count as "not visible yet" and never end the watcher.
/// Without `max_checks` it polls until the artifact shows up or shutdown.
pub struct PublicationWatcher {
    public_id: String,
    source_dir: PathBuf,
    checker: Arc<dyn VisibilityChecker>,
    interval: Duration,
    max_checks: Option<u32>,
    shutdown: watch::Receiver<bool>,
}

impl PublicationWatcher {
    pub fn new(
        public_id: impl Into<String>,
        source_dir: impl Into<PathBuf>,
        checker: Arc<dyn VisibilityChecker>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            public_id: public_id.into(),
            source_dir: source_dir.into(),
            checker,
            interval,
            max_checks: None,
            shutdown,
        }
    }

    pub fn with_max_checks(mut self, max_checks: Option<u32>) -> Self {
        self.max_checks = max_checks;
        self
    }

    pub fn spawn(self) -> JoinHandle<WatchOutcome> {
        let span = tracing::info_span!("watcher", public_id = %self.public_id);
        tokio::spawn(self.run().instrument(span))
    }

    pub async fn run(mut self) -> WatchOutcome {
        info!(
            "Watching for visibility every {:?}, then removing {}",
            self.interval,
            self.source_dir.display()
        );
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut streak = FailureStreak::new(LOGGED_CHECK_FAILURES);
        let mut checks = 0u32;

        loop {
            if *self.shutdown.borrow() {
                debug!("Watcher cancelled");
                return WatchOutcome::Cancelled;
            }
            if self.max_checks.is_some_and(|max| checks >= max) {
                warn!("Not visible after {} checks, keeping {}", checks, self.source_dir.display());
                return WatchOutcome::GaveUp;
            }

            let ticked = tokio::select! {
                changed = self.shutdown.changed() => {
                    // A dropped sender means the supervisor is gone.
                    if changed.is_err() || *self.shutdown.borrow() {
                        debug!("Watcher cancelled");
                        return WatchOutcome::Cancelled;
                    }
                    false
                }
                _ = ticker.tick() => true,
            };
            if !ticked {
                continue;
            }
            checks += 1;

            match self.checker.is_visible(&self.public_id).await {
                Ok(true) => {
                    streak.record_success();
                    return self.reclaim().await;
                }
                Ok(false) => {
                    streak.record_success();
                    debug!("Not visible yet (check {})", checks);
                }
                Err(e) => {
                    if streak.record_failure() {
                        let fault = RecorderError::visibility_check(e.to_string());
                        warn!("{}; will retry", fault);
                    }
                }
            }
        }
    }

    async fn reclaim(&self) -> WatchOutcome {
        match remove_dir_with_files(&self.source_dir).await {
            Ok(()) => {
                metrics::record_artifact_reclaimed();
                info!("Artifact visible, removed {}", self.source_dir.display());
                WatchOutcome::Reclaimed
            }
            Err(e) => {
                warn!("Artifact visible but {} could not be removed: {}", self.source_dir.display(), e);
                WatchOutcome::ReclaimFailed
            }
        }
    }
}
