//! Shared data models for the LiveCut recorder.
//!
//! This crate provides Serde-serializable types for:
//! - Capture segments and the reconciled timeline
//! - Chat (danmu) events
//! - Highlight windows and clip jobs
//! - Session state and session context
//! - Filename conventions shared by capture, processing and upload

pub mod clip;
pub mod danmu;
pub mod error;
pub mod highlight;
pub mod naming;
pub mod segment;
pub mod session;
pub mod timeline;

// Re-export common types
pub use clip::ClipJob;
pub use danmu::DanmuEvent;
pub use error::{ModelError, ModelResult};
pub use highlight::HighlightWindow;
pub use naming::{parse_segment_start, session_tag, SessionPaths};
pub use segment::Segment;
pub use session::{SessionContext, SessionState, SessionStatus};
pub use timeline::Timeline;
