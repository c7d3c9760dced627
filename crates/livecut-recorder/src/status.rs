//! Read-only view of every room's session state.
//!
//! Each controller owns the sending half of its status channels. The board
//! holds receivers only, so reading a room's status can never change it.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

use livecut_models::{SessionState, SessionStatus};

/// Receiving side of one room's status cell.
#[derive(Debug, Clone)]
pub struct RoomStatusHandle {
    room_id: String,
    status: watch::Receiver<SessionStatus>,
    live: watch::Receiver<bool>,
}

impl RoomStatusHandle {
    pub fn new(
        room_id: impl Into<String>,
        status: watch::Receiver<SessionStatus>,
        live: watch::Receiver<bool>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            status,
            live,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// State and transition time, always from the same transition.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn is_live(&self) -> bool {
        *self.live.borrow()
    }

    /// Receiver for awaiting status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let status = self.status();
        RoomSnapshot {
            room_id: self.room_id.clone(),
            live: self.is_live(),
            state: status.state,
            label: status.state.label(),
            changed_at: status.changed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub live: bool,
    pub state: SessionState,
    pub label: &'static str,
    pub changed_at: DateTime<Utc>,
}

/// Status handles of every room.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    rooms: Vec<RoomStatusHandle>,
}

impl StatusBoard {
    pub fn new(rooms: Vec<RoomStatusHandle>) -> Self {
        Self { rooms }
    }

    pub fn snapshots(&self) -> Vec<RoomSnapshot> {
        self.rooms.iter().map(RoomStatusHandle::snapshot).collect()
    }

    /// Plain-text table of all rooms.
    pub fn render_table(&self) -> String {
        let mut out = format!("{:<14} {:<6} {:<20} {}\n", "room", "live", "state", "since");
        for snap in self.snapshots() {
            let since = snap.changed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
            let _ = writeln!(
                out,
                "{:<14} {:<6} {:<20} {}",
                snap.room_id,
                if snap.live { "yes" } else { "no" },
                snap.label,
                since
            );
        }
        out
    }

    /// Log the table every `every` until shutdown.
    pub async fn report(self, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => {
                    info!("Room status\n{}", self.render_table());
                }
            }
        }
    }
}
