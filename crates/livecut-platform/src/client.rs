//! Bilibili web API client.
//!
//! Two public endpoints are used:
//! - `GET {live_api_base}/room/v1/Room/get_info?room_id=` for live status
//! - `GET {web_api_base}/x/web-interface/view?bvid=` for video visibility
//!
//! Both wrap their payload in `{"code": 0, "message": "...", "data": {...}}`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info_span, Instrument};

use crate::error::{PlatformError, PlatformResult};
use crate::source::{LiveStatusSource, RoomInfo, VisibilityChecker};

pub const PLATFORM_REQUESTS_TOTAL: &str = "livecut_platform_requests_total";
pub const PLATFORM_REQUEST_DURATION_SECONDS: &str = "livecut_platform_request_duration_seconds";

/// `live_status` value of a room that is broadcasting.
const LIVE_STATUS_ON_AIR: i64 = 1;

/// `state` value of a video that passed review and is public.
const VIDEO_STATE_PUBLIC: i64 = 0;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct BilibiliConfig {
    /// Base URL of the live-room API
    pub live_api_base: String,
    /// Base URL of the main web API
    pub web_api_base: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Extra headers sent with every request
    pub headers: HashMap<String, String>,
}

impl Default for BilibiliConfig {
    fn default() -> Self {
        Self {
            live_api_base: "https://api.live.bilibili.com".to_string(),
            web_api_base: "https://api.bilibili.com".to_string(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RoomData {
    live_status: i64,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct VideoData {
    state: i64,
}

/// Snapshot of a live room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomStatus {
    pub live: bool,
    pub title: String,
}

/// Bilibili REST client.
#[derive(Clone)]
pub struct BilibiliClient {
    http: Client,
    config: BilibiliConfig,
}

impl BilibiliClient {
    /// Create a new client.
    pub fn new(config: BilibiliConfig) -> PlatformResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .default_headers(build_headers(&config.headers)?)
            .user_agent(concat!("livecut/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, config })
    }

    /// Handle bound to one room, usable as a [`LiveStatusSource`].
    pub fn room(&self, room_id: impl Into<String>) -> BilibiliRoom {
        BilibiliRoom {
            client: self.clone(),
            room_id: room_id.into(),
        }
    }

    /// Fetch live status and title of a room.
    pub async fn room_status(&self, room_id: &str) -> PlatformResult<RoomStatus> {
        let url = format!("{}/room/v1/Room/get_info", self.config.live_api_base);
        let span = info_span!("platform_request", operation = "room_status", room_id = %room_id);

        let envelope: Envelope<RoomData> = self
            .execute("room_status", self.get_json(&url, &[("room_id", room_id)]))
            .instrument(span)
            .await?;

        if envelope.code != 0 {
            return Err(PlatformError::Api {
                code: envelope.code,
                message: envelope.message,
            });
        }
        let data = envelope
            .data
            .ok_or_else(|| PlatformError::invalid_response("room info without data"))?;

        Ok(RoomStatus {
            live: data.live_status == LIVE_STATUS_ON_AIR,
            title: data.title,
        })
    }

    /// Whether a published video has passed review and is public.
    ///
    /// A non-zero API code (not found, under review) is reported as not visible.
    pub async fn video_visible(&self, bvid: &str) -> PlatformResult<bool> {
        let url = format!("{}/x/web-interface/view", self.config.web_api_base);
        let span = info_span!("platform_request", operation = "video_visible", public_id = %bvid);

        let envelope: Envelope<VideoData> = self
            .execute("video_visible", self.get_json(&url, &[("bvid", bvid)]))
            .instrument(span)
            .await?;

        if envelope.code != 0 {
            debug!(code = envelope.code, "Video not visible: {}", envelope.message);
            return Ok(false);
        }
        Ok(envelope
            .data
            .is_some_and(|d| d.state == VIDEO_STATE_PUBLIC))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> PlatformResult<T> {
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Http {
                status: status.as_u16(),
                message: format!("{} failed: {}", url, body),
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn execute<T, F>(&self, operation: &'static str, fut: F) -> PlatformResult<T>
    where
        F: std::future::Future<Output = PlatformResult<T>>,
    {
        let start = Instant::now();
        let result = fut.await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!(PLATFORM_REQUESTS_TOTAL, "operation" => operation, "outcome" => outcome)
            .increment(1);
        histogram!(PLATFORM_REQUEST_DURATION_SECONDS, "operation" => operation)
            .record(start.elapsed().as_secs_f64());
        result
    }
}

fn build_headers(headers: &HashMap<String, String>) -> PlatformResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| PlatformError::config(format!("invalid header name: {}", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| PlatformError::config(format!("invalid value for header {}", name)))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[async_trait]
impl VisibilityChecker for BilibiliClient {
    async fn is_visible(&self, public_id: &str) -> PlatformResult<bool> {
        self.video_visible(public_id).await
    }
}

/// A [`BilibiliClient`] bound to one room id.
#[derive(Clone)]
pub struct BilibiliRoom {
    client: BilibiliClient,
    room_id: String,
}

impl BilibiliRoom {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }
}

#[async_trait]
impl LiveStatusSource for BilibiliRoom {
    async fn is_live(&self) -> PlatformResult<bool> {
        Ok(self.client.room_status(&self.room_id).await?.live)
    }

    async fn room_info(&self) -> PlatformResult<RoomInfo> {
        let status = self.client.room_status(&self.room_id).await?;
        Ok(RoomInfo {
            display_name: status.title,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> BilibiliClient {
        BilibiliClient::new(BilibiliConfig {
            live_api_base: server.uri(),
            web_api_base: server.uri(),
            headers: HashMap::from([("Referer".to_string(), "https://live.bilibili.com".to_string())]),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_room_is_live() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/room/v1/Room/get_info"))
            .and(query_param("room_id", "5561470"))
            .and(header("Referer", "https://live.bilibili.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "ok",
                "data": {"live_status": 1, "title": "Friday stream"}
            })))
            .mount(&server)
            .await;

        let room = client_for(&server).room("5561470");
        assert!(room.is_live().await.unwrap());
        assert_eq!(room.room_info().await.unwrap().display_name, "Friday stream");
    }

    #[tokio::test]
    async fn test_rebroadcast_is_not_live() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/room/v1/Room/get_info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": {"live_status": 2, "title": "replay"}
            })))
            .mount(&server)
            .await;

        assert!(!client_for(&server).room("1").is_live().await.unwrap());
    }

    #[tokio::test]
    async fn test_room_api_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/room/v1/Room/get_info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 1, "message": "room not found", "data": null
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).room("1").is_live().await.unwrap_err();
        assert!(matches!(err, PlatformError::Api { code: 1, .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).room("1").is_live().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_video_visibility() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x/web-interface/view"))
            .and(query_param("bvid", "BV1xx411c7mD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0, "data": {"state": 0}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/x/web-interface/view"))
            .and(query_param("bvid", "BV1pending00"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0, "data": {"state": -1}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/x/web-interface/view"))
            .and(query_param("bvid", "BV1missing00"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": -404, "message": "not found"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.is_visible("BV1xx411c7mD").await.unwrap());
        assert!(!client.is_visible("BV1pending00").await.unwrap());
        assert!(!client.is_visible("BV1missing00").await.unwrap());
    }

    #[test]
    fn test_invalid_header_is_config_error() {
        let result = BilibiliClient::new(BilibiliConfig {
            headers: HashMap::from([("bad header".to_string(), "x".to_string())]),
            ..Default::default()
        });
        assert!(matches!(result, Err(PlatformError::Config(_))));
    }
}
