//! Chat-burst highlight detection.
//!
//! Chat events are grouped into fixed-width buckets anchored at the start
//! of the live session. Only buckets holding at least one event exist. A
//! two-state machine walks the buckets in order and opens a burst when a
//! bucket's volume jumps by `up_ratio` over the previous bucket, closing it
//! when volume falls below `down_ratio` of the previous bucket.

use std::path::Path;

use chrono::{DateTime, Local};
use tokio::fs;
use tracing::{debug, warn};

use livecut_models::{DanmuEvent, HighlightWindow, ModelResult};

use crate::config::ParserConfig;
use crate::error::RecorderError;
use crate::keywords::top_keywords;
use crate::metrics;

/// Chat log written by the chat capture, one JSON object per line.
pub const DANMU_LOG: &str = "danmu.jsonl";

/// Paid-message log, one JSON object per line.
pub const SUPERCHAT_LOG: &str = "superchat.jsonl";

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// Bucket width in seconds
    pub interval: i64,
    pub up_ratio: f64,
    pub down_ratio: f64,
    pub top_k: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        ParserConfig::default().into()
    }
}

impl From<ParserConfig> for DetectorSettings {
    fn from(config: ParserConfig) -> Self {
        Self {
            interval: config.interval,
            up_ratio: config.up_ratio,
            down_ratio: config.down_ratio,
            top_k: config.top_k,
        }
    }
}

/// Events of one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBucket {
    /// Bucket start, seconds since the epoch
    pub start: i64,
    pub texts: Vec<String>,
}

/// Group time-ordered events into buckets of `interval` seconds.
///
/// Bucket `k` spans `[anchor + k * interval, anchor + (k + 1) * interval)`;
/// events before the anchor land in negative buckets.
pub fn bucketize(events: &[DanmuEvent], anchor: i64, interval: i64) -> Vec<TimeBucket> {
    let interval = interval.max(1);
    let mut buckets: Vec<TimeBucket> = Vec::new();

    for event in events {
        let start = anchor + (event.timestamp - anchor).div_euclid(interval) * interval;
        match buckets.last_mut() {
            Some(bucket) if bucket.start == start => bucket.texts.push(event.text.clone()),
            _ => buckets.push(TimeBucket {
                start,
                texts: vec![event.text.clone()],
            }),
        }
    }
    buckets
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Volume {
    Normal,
    Burst,
}

/// Finds bursts of chat volume.
#[derive(Debug, Clone, Default)]
pub struct HighlightDetector {
    settings: DetectorSettings,
}

impl HighlightDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self { settings }
    }

    /// Detect highlight windows in `events`, which must be sorted by time.
    pub fn detect(&self, live_start: DateTime<Local>, events: &[DanmuEvent]) -> Vec<HighlightWindow> {
        let buckets = bucketize(events, live_start.timestamp(), self.settings.interval);
        self.detect_in_buckets(&buckets)
    }

    /// Run the burst machine over consecutive buckets.
    ///
    /// Windows come out in bucket order and never overlap. A burst still
    /// open after the last bucket yields nothing.
    pub fn detect_in_buckets(&self, buckets: &[TimeBucket]) -> Vec<HighlightWindow> {
        let mut windows = Vec::new();
        let mut volume = Volume::Normal;
        let mut prev_count: Option<usize> = None;
        let mut burst_start = 0i64;
        let mut burst_texts: Vec<&str> = Vec::new();

        for bucket in buckets {
            let count = bucket.texts.len();
            if let Some(prev) = prev_count {
                let prev = prev as f64;
                match volume {
                    Volume::Normal if count as f64 >= prev * self.settings.up_ratio => {
                        volume = Volume::Burst;
                        burst_start = bucket.start;
                        burst_texts.clear();
                        burst_texts.extend(bucket.texts.iter().map(String::as_str));
                    }
                    Volume::Burst if (count as f64) < prev * self.settings.down_ratio => {
                        volume = Volume::Normal;
                        let tags = top_keywords(&burst_texts, self.settings.top_k);
                        match (to_local(burst_start), to_local(bucket.start)) {
                            (Some(start), Some(end)) => {
                                debug!("Burst {} -> {} tags={:?}", start, end, tags);
                                windows.push(HighlightWindow::new(start, end, tags));
                            }
                            _ => warn!("Burst at {} is out of the representable range", burst_start),
                        }
                        burst_texts.clear();
                    }
                    Volume::Burst => {
                        burst_texts.extend(bucket.texts.iter().map(String::as_str));
                    }
                    Volume::Normal => {}
                }
            }
            prev_count = Some(count);
        }

        if volume == Volume::Burst {
            debug!("Dropping burst left open at {}", burst_start);
        }
        windows
    }
}

fn to_local(epoch_secs: i64) -> Option<DateTime<Local>> {
    DateTime::from_timestamp(epoch_secs, 0).map(|t| t.with_timezone(&Local))
}

/// Chat events of one session, plus how many records were unusable.
#[derive(Debug, Default)]
pub struct ChatLog {
    pub events: Vec<DanmuEvent>,
    pub skipped: usize,
}

/// Read the session's chat logs, sorted by timestamp.
///
/// Missing logs are empty. Malformed records are skipped one by one.
pub async fn load_chat_events(danmu_dir: &Path) -> std::io::Result<ChatLog> {
    let mut log = ChatLog::default();
    read_log(&danmu_dir.join(DANMU_LOG), DanmuEvent::from_danmu_line, &mut log).await?;
    read_log(
        &danmu_dir.join(SUPERCHAT_LOG),
        DanmuEvent::from_superchat_line,
        &mut log,
    )
    .await?;

    log.events.sort_by_key(|e| e.timestamp);
    if log.skipped > 0 {
        metrics::record_chat_records_skipped(log.skipped as u64);
    }
    Ok(log)
}

async fn read_log(
    path: &Path,
    parse: fn(&str) -> ModelResult<DanmuEvent>,
    log: &mut ChatLog,
) -> std::io::Result<()> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse(line) {
            Ok(event) => log.events.push(event),
            Err(e) => {
                log.skipped += 1;
                let fault = RecorderError::detection(format!(
                    "{}:{}: {}",
                    path.display(),
                    number + 1,
                    e
                ));
                warn!("{}", fault);
            }
        }
    }
    Ok(())
}
