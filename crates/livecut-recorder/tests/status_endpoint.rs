//! Router-level tests for the status endpoint.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use livecut_models::SessionState;
use livecut_recorder::server::create_router;
use livecut_recorder::{StatusBoard, StatusCell};

async fn get_json(board: StatusBoard, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = create_router(board, None)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or_default())
}

#[tokio::test]
async fn test_health_endpoint() {
    let (status, body) = get_json(StatusBoard::default(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_status_reflects_latest_transition() {
    let first = StatusCell::new("101");
    let second = StatusCell::new("202");
    let board = StatusBoard::new(vec![first.handle(), second.handle()]);

    first.set_live(true);
    first.transition(SessionState::Recording);
    second.transition(SessionState::PublishingBackup);

    let (status, body) = get_json(board, "/status").await;
    assert_eq!(status, StatusCode::OK);

    let rooms = body["rooms"].as_array().unwrap();
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0]["room_id"], "101");
    assert_eq!(rooms[0]["state"], "recording");
    assert_eq!(rooms[0]["live"], true);
    assert_eq!(rooms[1]["state"], "publishing_backup");
    assert_eq!(rooms[1]["label"], "Uploading backup");
}

#[tokio::test]
async fn test_metrics_route_absent_without_exporter() {
    let (status, _) = get_json(StatusBoard::default(), "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
