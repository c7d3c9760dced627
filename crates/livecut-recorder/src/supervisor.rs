//! Wires configuration to collaborators and runs every room.

use std::sync::Arc;

use futures::future::join_all;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::watch;
use tracing::{error, info, warn};

use livecut_media::{FfmpegToolchain, MediaToolchain};
use livecut_platform::{BilibiliClient, BilibiliConfig};
use livecut_storage::{BackupStorage, S3BackupClient};

use crate::capture::{CaptureKind, CaptureTask, CommandCapture, NoopCapture};
use crate::config::{CaptureCommand, RecorderConfig, RoomConfig};
use crate::controller::{ControllerSettings, RoomServices, SessionController};
use crate::error::RecorderResult;
use crate::pipeline::PipelineSettings;
use crate::publish::{CommandPublisher, PublishSettings, Publisher};
use crate::server;
use crate::status::StatusBoard;

/// Builds one [`SessionController`] per configured room.
pub struct Supervisor {
    config: RecorderConfig,
    platform: BilibiliClient,
    toolchain: Arc<dyn MediaToolchain>,
    backup: Option<Arc<dyn BackupStorage>>,
}

impl Supervisor {
    pub fn new(config: RecorderConfig) -> RecorderResult<Self> {
        let platform = BilibiliClient::new(BilibiliConfig {
            headers: config.root.request_header.clone(),
            ..Default::default()
        })?;

        let toolchain: Arc<dyn MediaToolchain> = match config.root.ffmpeg_timeout {
            Some(secs) => Arc::new(FfmpegToolchain::with_timeout(secs)),
            None => Arc::new(FfmpegToolchain::new()),
        };

        let wants_backup = config.rooms.iter().any(|r| r.backup);
        let backup = match config.root.resolve_backup_storage() {
            Some(storage) if wants_backup => match S3BackupClient::new(storage) {
                Ok(client) => {
                    info!("Backups go to bucket {}", client.bucket());
                    Some(Arc::new(client) as Arc<dyn BackupStorage>)
                }
                Err(e) => {
                    warn!("Backup storage unusable, backups disabled: {}", e);
                    None
                }
            },
            None if wants_backup => {
                warn!("Rooms request backups but no backup storage is configured");
                None
            }
            _ => None,
        };

        Ok(Self {
            config,
            platform,
            toolchain,
            backup,
        })
    }

    fn services_for(&self, room: &RoomConfig) -> RecorderResult<RoomServices> {
        let root = &self.config.root;
        let live = Arc::new(self.platform.room(room.room_id.clone()));

        let capture = |kind: CaptureKind, command: Option<&CaptureCommand>| -> Arc<dyn CaptureTask> {
            match command {
                Some(command) => Arc::new(CommandCapture::new(
                    kind,
                    command.clone(),
                    live.clone(),
                    root.check_interval(),
                )),
                None => Arc::new(NoopCapture::new(kind)),
            }
        };

        let publisher = match (&root.uploader.command, room.uploader.uploads_anything()) {
            (Some(command), true) => {
                let service = CommandPublisher::new(command.clone(), room.uploader.account.username.clone())?;
                let settings = PublishSettings::for_room(room, root.uploader.upload_by_edit, root.uploader.max_retry);
                Some(Arc::new(Publisher::new(Arc::new(service), settings)))
            }
            (None, true) => {
                warn!(room_id = %room.room_id, "No uploader command configured, publishing disabled");
                None
            }
            _ => None,
        };

        Ok(RoomServices {
            live: live.clone(),
            video_capture: capture(CaptureKind::Video, room.recorder.video.as_ref()),
            chat_capture: capture(CaptureKind::Chat, room.recorder.chat.as_ref()),
            toolchain: Arc::clone(&self.toolchain),
            publisher,
            visibility: Arc::new(self.platform.clone()),
            backup: if room.backup { self.backup.clone() } else { None },
        })
    }

    /// One controller per room, all listening to `shutdown`.
    pub fn build_controllers(&self, shutdown: &watch::Receiver<bool>) -> RecorderResult<Vec<SessionController>> {
        let root = &self.config.root;
        self.config
            .rooms
            .iter()
            .map(|room| {
                let settings = ControllerSettings {
                    check_interval: root.check_interval(),
                    data_root: root.data_path.clone(),
                    pipeline: PipelineSettings::for_room(room, root.max_clip_jobs),
                    backup_prefix: root.backup_prefix.clone(),
                    watcher_interval: root.watcher_interval(),
                    watcher_max_checks: root.watcher.max_checks,
                };
                Ok(SessionController::new(
                    room.room_id.clone(),
                    self.services_for(room)?,
                    settings,
                    shutdown.clone(),
                ))
            })
            .collect()
    }

    /// Run every room until Ctrl-C.
    pub async fn run(self, metrics_handle: Option<PrometheusHandle>) -> RecorderResult<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let controllers = self.build_controllers(&shutdown_rx)?;
        let board = StatusBoard::new(controllers.iter().map(SessionController::status_handle).collect());
        info!("Monitoring {} rooms", controllers.len());

        let handles: Vec<_> = controllers
            .into_iter()
            .map(|controller| tokio::spawn(controller.run()))
            .collect();

        tokio::spawn(board.clone().report(self.config.root.print_interval(), shutdown_rx.clone()));

        if let Some(bind) = self.config.root.status_bind.clone() {
            let router = server::create_router(board, metrics_handle);
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move {
                if let Err(e) = server::serve(&bind, router, shutdown).await {
                    error!("Status endpoint stopped: {}", e);
                }
            });
        }

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Cannot listen for Ctrl-C, shutting down: {}", e),
        }
        let _ = shutdown_tx.send(true);

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Controller task failed: {}", e);
            }
        }
        info!("All rooms stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livecut_models::SessionState;

    #[tokio::test]
    async fn test_one_controller_per_room() {
        let config = RecorderConfig::from_json(
            r#"{"root": {"uploader": {"command": {"program": "up"}}},
                "rooms": [
                    {"room_id": 1, "recorder": {"video": {"program": "rec"}}},
                    {"room_id": 2, "recorder": {"video": {"program": "rec"},
                                                "chat": {"program": "chat"}},
                     "uploader": {"record": {"upload_record": false}}}
                ]}"#,
        )
        .unwrap();
        let supervisor = Supervisor::new(config).unwrap();
        let (_tx, rx) = watch::channel(false);

        let controllers = supervisor.build_controllers(&rx).unwrap();
        assert_eq!(controllers.len(), 2);
        for controller in &controllers {
            assert_eq!(controller.status_handle().status().state, SessionState::Waiting);
        }
        let ids: Vec<String> = controllers
            .iter()
            .map(|c| c.status_handle().room_id().to_string())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }
}
