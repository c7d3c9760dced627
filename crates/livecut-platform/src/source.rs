//! Collaborator traits consumed by the session controller and watchers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlatformResult;

/// Descriptive room metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Human-readable room title, substituted into publication titles
    pub display_name: String,
}

/// Answers whether a room is currently broadcasting.
#[async_trait]
pub trait LiveStatusSource: Send + Sync {
    async fn is_live(&self) -> PlatformResult<bool>;

    async fn room_info(&self) -> PlatformResult<RoomInfo>;
}

/// Answers whether a published artifact is publicly visible yet.
#[async_trait]
pub trait VisibilityChecker: Send + Sync {
    async fn is_visible(&self, public_id: &str) -> PlatformResult<bool>;
}
