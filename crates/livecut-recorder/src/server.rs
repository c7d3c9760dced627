//! Status HTTP endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{RecorderError, RecorderResult};
use crate::status::{RoomSnapshot, StatusBoard};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub rooms: Vec<RoomSnapshot>,
    pub timestamp: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Every room's live flag and session state.
pub async fn status(State(board): State<StatusBoard>) -> Json<StatusResponse> {
    Json(StatusResponse {
        rooms: board.snapshots(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

pub fn create_router(board: StatusBoard, metrics_handle: Option<PrometheusHandle>) -> Router {
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(board)
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
}

/// Serve `router` on `bind` until shutdown is signalled.
pub async fn serve(bind: &str, router: Router, mut shutdown: watch::Receiver<bool>) -> RecorderResult<()> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| RecorderError::config(format!("cannot bind status endpoint {}: {}", bind, e)))?;
    info!("Status endpoint listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use livecut_models::{SessionState, SessionStatus};

    use crate::status::RoomStatusHandle;

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_status_lists_rooms() {
        let (_tx, rx) = watch::channel(SessionStatus::new(SessionState::PublishingPrimary));
        let (_live_tx, live_rx) = watch::channel(true);
        let board = StatusBoard::new(vec![RoomStatusHandle::new("7", rx, live_rx)]);

        let Json(body) = status(State(board)).await;
        assert_eq!(body.rooms.len(), 1);
        assert_eq!(body.rooms[0].state, SessionState::PublishingPrimary);
        assert!(body.rooms[0].live);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["rooms"][0]["state"], "publishing_primary");
        assert_eq!(json["rooms"][0]["label"], "Publishing");
    }

    #[test]
    fn test_router_builds_without_metrics() {
        let _router = create_router(StatusBoard::default(), None);
    }
}
