//! Recorder configuration.
//!
//! Configuration is a single JSON document with a `root` section shared by
//! every room and a `rooms` list (`spec` is accepted as an alias) with one
//! entry per monitored room. Every field has a default, so a minimal file
//! only names the rooms and their capture commands.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use livecut_media::reconcile::DEFAULT_MIN_SEGMENT_BYTES;
use livecut_media::{ClipSettings, ReconcileOptions};
use livecut_storage::S3BackupConfig;

use crate::error::{RecorderError, RecorderResult};

/// Environment variable naming the config file when no argument is given.
pub const CONFIG_ENV_VAR: &str = "LIVECUT_CONFIG";

/// Config file used when neither an argument nor the env var is set.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Resolve the config path: first CLI argument, then env var, then default.
pub fn config_path(arg: Option<String>) -> PathBuf {
    arg.or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Complete recorder configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecorderConfig {
    #[serde(default)]
    pub root: RootConfig,
    #[serde(default, alias = "spec")]
    pub rooms: Vec<RoomConfig>,
}

/// Settings shared by every room.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    /// Seconds between live-status polls
    pub check_interval: u64,
    /// Seconds between status table log lines
    pub print_interval: u64,
    /// Root under which `data/` is created
    pub data_path: PathBuf,
    /// Extra headers for platform API requests
    pub request_header: HashMap<String, String>,
    pub logger: LoggerConfig,
    pub uploader: RootUploaderConfig,
    /// S3-compatible backup target; falls back to `BACKUP_S3_*` env vars
    pub backup_storage: Option<S3BackupConfig>,
    /// Key prefix for backup uploads
    pub backup_prefix: String,
    /// `host:port` of the status endpoint; disabled when absent
    pub status_bind: Option<String>,
    pub watcher: WatcherConfig,
    /// Kill FFmpeg invocations running longer than this many seconds
    pub ffmpeg_timeout: Option<u64>,
    /// Concurrent clip trims per session
    pub max_clip_jobs: usize,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            check_interval: 100,
            print_interval: 60,
            data_path: PathBuf::from("./"),
            request_header: HashMap::new(),
            logger: LoggerConfig::default(),
            uploader: RootUploaderConfig::default(),
            backup_storage: None,
            backup_prefix: "archives/".to_string(),
            status_bind: None,
            watcher: WatcherConfig::default(),
            ffmpeg_timeout: None,
            max_clip_jobs: 2,
        }
    }
}

impl RootConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn print_interval(&self) -> Duration {
        Duration::from_secs(self.print_interval.max(1))
    }

    /// Visibility poll interval, defaulting to the live-status interval.
    pub fn watcher_interval(&self) -> Duration {
        Duration::from_secs(self.watcher.check_interval.unwrap_or(self.check_interval))
    }

    /// Configured backup target, else one built from the environment.
    pub fn resolve_backup_storage(&self) -> Option<S3BackupConfig> {
        self.backup_storage
            .clone()
            .or_else(|| S3BackupConfig::from_env().ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// DEBUG, INFO, WARN or ERROR
    pub log_level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RootUploaderConfig {
    /// Publish the first part, then append the rest through edits
    pub upload_by_edit: bool,
    /// Publish attempts after the first failure
    pub max_retry: u32,
    /// External uploader; publishing is disabled when absent
    pub command: Option<UploaderCommand>,
}

impl Default for RootUploaderConfig {
    fn default() -> Self {
        Self {
            upload_by_edit: false,
            max_retry: 10,
            command: None,
        }
    }
}

fn default_id_pattern() -> String {
    "BV[0-9A-Za-z]{10}".to_string()
}

/// External uploader program.
///
/// `{manifest}` in `args` is replaced by the path of a JSON manifest
/// describing the parts; if no argument mentions it, the path is appended.
#[derive(Debug, Clone, Deserialize)]
pub struct UploaderCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Regex locating the public id in the uploader's stdout
    #[serde(default = "default_id_pattern")]
    pub id_pattern: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Seconds between visibility checks; defaults to `check_interval`
    pub check_interval: Option<u64>,
    /// Give up after this many checks; unbounded when absent
    pub max_checks: Option<u32>,
}

/// One monitored room.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    #[serde(deserialize_with = "string_or_number")]
    pub room_id: String,
    /// Upload merged recording and chat logs to backup storage
    #[serde(default)]
    pub backup: bool,
    #[serde(default)]
    pub recorder: CaptureConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub clipper: ClipperConfig,
    #[serde(default)]
    pub uploader: RoomUploaderConfig,
}

fn default_restart_delay() -> u64 {
    5
}

/// External capture program for one stream of a room.
///
/// Arguments may use `{room_id}`, `{output}`, `{output_dir}` and
/// `{danmu_dir}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Seconds to wait before relaunching after an exit while still live
    #[serde(default = "default_restart_delay")]
    pub restart_delay: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub keep_raw_record: bool,
    pub min_segment_bytes: u64,
    pub video: Option<CaptureCommand>,
    pub chat: Option<CaptureCommand>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            keep_raw_record: false,
            min_segment_bytes: DEFAULT_MIN_SEGMENT_BYTES,
            video: None,
            chat: None,
        }
    }
}

impl CaptureConfig {
    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            min_segment_bytes: self.min_segment_bytes,
            keep_raw: self.keep_raw_record,
        }
    }
}

/// Chat-burst detection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Bucket width in seconds
    pub interval: i64,
    pub up_ratio: f64,
    pub down_ratio: f64,
    #[serde(rename = "topK", alias = "top_k")]
    pub top_k: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            interval: 30,
            up_ratio: 2.5,
            down_ratio: 0.75,
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClipperConfig {
    pub enable_clipper: bool,
    pub min_length: f64,
    pub start_offset: f64,
    pub end_offset: f64,
}

impl Default for ClipperConfig {
    fn default() -> Self {
        let clip = ClipSettings::default();
        Self {
            enable_clipper: false,
            min_length: clip.min_length,
            start_offset: clip.start_offset,
            end_offset: clip.end_offset,
        }
    }
}

impl ClipperConfig {
    pub fn settings(&self) -> ClipSettings {
        ClipSettings {
            start_offset: self.start_offset,
            end_offset: self.end_offset,
            min_length: self.min_length,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomUploaderConfig {
    /// 1 = original content, 2 = repost
    pub copyright: u8,
    pub account: AccountConfig,
    pub record: RecordUploadConfig,
    pub clips: ClipsUploadConfig,
}

impl Default for RoomUploaderConfig {
    fn default() -> Self {
        Self {
            copyright: 2,
            account: AccountConfig::default(),
            record: RecordUploadConfig::default(),
            clips: ClipsUploadConfig::default(),
        }
    }
}

impl RoomUploaderConfig {
    pub fn uploads_anything(&self) -> bool {
        self.record.upload_record || self.clips.upload_clips
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordUploadConfig {
    pub upload_record: bool,
    pub keep_record_after_upload: bool,
    /// Seconds per chunk; `<= 0` uploads the merged file whole
    pub split_interval: i64,
    pub title: String,
    pub tid: u32,
    pub tags: Vec<String>,
    pub desc: String,
}

impl Default for RecordUploadConfig {
    fn default() -> Self {
        Self {
            upload_record: true,
            keep_record_after_upload: true,
            split_interval: 3600,
            title: String::new(),
            tid: 27,
            tags: Vec::new(),
            desc: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClipsUploadConfig {
    pub upload_clips: bool,
    pub keep_clips_after_upload: bool,
    pub title: String,
    pub tid: u32,
    pub tags: Vec<String>,
    pub desc: String,
}

impl Default for ClipsUploadConfig {
    fn default() -> Self {
        Self {
            upload_clips: false,
            keep_clips_after_upload: false,
            title: String::new(),
            tid: 27,
            tags: Vec::new(),
            desc: String::new(),
        }
    }
}

/// Room ids appear as numbers in most hand-written configs.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

impl RecorderConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(text: &str) -> RecorderResult<Self> {
        let config: RecorderConfig = serde_json::from_str(text)
            .map_err(|e| RecorderError::config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the configuration file at `path`.
    pub async fn load(path: impl AsRef<Path>) -> RecorderResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            RecorderError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Reject configurations the recorder cannot run with.
    pub fn validate(&self) -> RecorderResult<()> {
        if self.rooms.is_empty() {
            return Err(RecorderError::config("no rooms configured"));
        }
        if self.root.check_interval == 0 {
            return Err(RecorderError::config("root.check_interval must be positive"));
        }
        if let Some(cmd) = &self.root.uploader.command {
            regex::Regex::new(&cmd.id_pattern).map_err(|e| {
                RecorderError::config(format!("uploader id_pattern is not a valid regex: {}", e))
            })?;
        }

        let mut seen = HashSet::new();
        for room in &self.rooms {
            let id = room.room_id.trim();
            if id.is_empty() {
                return Err(RecorderError::config("room_id must not be empty"));
            }
            if id.contains(['_', '/', '\\']) {
                return Err(RecorderError::config(format!(
                    "room_id {:?} must not contain '_' or path separators",
                    id
                )));
            }
            if !seen.insert(id.to_string()) {
                return Err(RecorderError::config(format!("duplicate room_id {}", id)));
            }
            if room.recorder.video.is_none() {
                return Err(RecorderError::config(format!(
                    "room {} has no recorder.video capture command",
                    id
                )));
            }

            let parser = &room.parser;
            if parser.interval <= 0 {
                return Err(RecorderError::config(format!(
                    "room {}: parser.interval must be positive",
                    id
                )));
            }
            if !(parser.up_ratio > 0.0) || !(parser.down_ratio > 0.0) {
                return Err(RecorderError::config(format!(
                    "room {}: parser ratios must be positive",
                    id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "spec": [
            {"room_id": 5561470, "recorder": {"video": {"program": "rec"}}}
        ]
    }"#;

    #[test]
    fn test_defaults_fill_every_field() {
        let config = RecorderConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.root.check_interval, 100);
        assert_eq!(config.root.print_interval, 60);
        assert_eq!(config.root.logger.log_level, "INFO");
        assert_eq!(config.root.uploader.max_retry, 10);
        assert!(!config.root.uploader.upload_by_edit);
        assert_eq!(config.root.watcher_interval(), Duration::from_secs(100));

        let room = &config.rooms[0];
        assert_eq!(room.room_id, "5561470");
        assert!(!room.backup);
        assert_eq!(room.recorder.min_segment_bytes, 1024 * 1024);
        assert_eq!(room.parser.interval, 30);
        assert_eq!(room.parser.top_k, 5);
        assert!(!room.clipper.enable_clipper);
        assert_eq!(room.clipper.settings(), ClipSettings::default());
        assert_eq!(room.uploader.copyright, 2);
        assert!(room.uploader.record.upload_record);
        assert_eq!(room.uploader.record.split_interval, 3600);
        assert!(!room.uploader.clips.upload_clips);
        assert!(room.uploader.uploads_anything());
    }

    #[test]
    fn test_parser_top_k_key() {
        let json = r#"{"rooms": [{"room_id": "1", "recorder": {"video": {"program": "rec"}},
                       "parser": {"topK": 3, "interval": 60}}]}"#;
        let config = RecorderConfig::from_json(json).unwrap();
        assert_eq!(config.rooms[0].parser.top_k, 3);
        assert_eq!(config.rooms[0].parser.interval, 60);
        assert_eq!(config.rooms[0].parser.up_ratio, 2.5);
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            r#"{"rooms": []}"#,
            r#"{"rooms": [{"room_id": "1"}]}"#,
            r#"{"rooms": [{"room_id": "1_2", "recorder": {"video": {"program": "r"}}}]}"#,
            r#"{"rooms": [{"room_id": "1", "recorder": {"video": {"program": "r"}}},
                          {"room_id": 1, "recorder": {"video": {"program": "r"}}}]}"#,
            r#"{"rooms": [{"room_id": "1", "recorder": {"video": {"program": "r"}},
                           "parser": {"interval": 0}}]}"#,
            r#"{"rooms": [{"room_id": "1", "recorder": {"video": {"program": "r"}},
                           "parser": {"down_ratio": -1}}]}"#,
            r#"{"root": {"check_interval": 0},
                "rooms": [{"room_id": "1", "recorder": {"video": {"program": "r"}}}]}"#,
        ];
        for case in cases {
            let err = RecorderConfig::from_json(case).unwrap_err();
            assert!(matches!(err, RecorderError::Config(_)), "accepted: {}", case);
        }
    }

    #[test]
    fn test_config_path_prefers_argument() {
        assert_eq!(
            config_path(Some("custom.json".to_string())),
            PathBuf::from("custom.json")
        );
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, MINIMAL).await.unwrap();
        let config = RecorderConfig::load(&path).await.unwrap();
        assert_eq!(config.rooms.len(), 1);

        let missing = RecorderConfig::load(dir.path().join("nope.json")).await;
        assert!(matches!(missing, Err(RecorderError::Config(_))));
    }
}
