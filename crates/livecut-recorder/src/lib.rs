//! Unattended live broadcast recorder.
//!
//! This crate provides:
//! - Per-room session controllers driving capture, processing and publishing
//! - Chat-burst highlight detection and keyword tags
//! - Publication with visibility watchers that reclaim local storage
//! - Status board, status endpoint and Prometheus metrics
//! - Configuration loading and validation

pub mod capture;
pub mod config;
pub mod controller;
pub mod detector;
pub mod error;
pub mod keywords;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod publish;
pub mod retry;
pub mod server;
pub mod status;
pub mod supervisor;
pub mod watcher;

pub use capture::{CaptureKind, CaptureReport, CaptureTask, CommandCapture, NoopCapture};
pub use config::RecorderConfig;
pub use controller::{ControllerSettings, RoomServices, SessionController, SessionSummary, StatusCell};
pub use detector::{DetectorSettings, HighlightDetector};
pub use error::{RecorderError, RecorderResult};
pub use logging::SessionLogger;
pub use pipeline::{PipelineSettings, SessionOutputs, SessionPipeline};
pub use publish::{
    ArtifactKind, CommandPublisher, PublicationMetadata, PublicationService, PublishSettings,
    PublishedArtifact, Publisher, VideoPart,
};
pub use status::{RoomSnapshot, RoomStatusHandle, StatusBoard};
pub use supervisor::Supervisor;
pub use watcher::{PublicationWatcher, WatchOutcome};
