//! Chat (danmu) events.
//!
//! The chat capture appends one JSON object per line. Regular chat lines
//! carry their time in milliseconds under `properties.time`; paid
//! "superchat" lines carry a plain `time` in seconds.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// One chat message with its send time in seconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanmuEvent {
    pub text: String,
    pub timestamp: i64,
}

#[derive(Deserialize)]
struct DanmuLine {
    text: String,
    properties: DanmuProperties,
}

#[derive(Deserialize)]
struct DanmuProperties {
    /// Milliseconds since the epoch
    time: i64,
}

#[derive(Deserialize)]
struct SuperchatLine {
    text: String,
    /// Seconds since the epoch
    time: i64,
}

impl DanmuEvent {
    pub fn new(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            text: text.into(),
            timestamp,
        }
    }

    /// Parse a line of `danmu.jsonl`.
    pub fn from_danmu_line(line: &str) -> ModelResult<Self> {
        let parsed: DanmuLine = serde_json::from_str(line)?;
        if parsed.properties.time < 0 {
            return Err(ModelError::malformed_chat_record(format!(
                "negative time {}",
                parsed.properties.time
            )));
        }
        Ok(Self::new(parsed.text, parsed.properties.time / 1000))
    }

    /// Parse a line of `superchat.jsonl`.
    pub fn from_superchat_line(line: &str) -> ModelResult<Self> {
        let parsed: SuperchatLine = serde_json::from_str(line)?;
        if parsed.time < 0 {
            return Err(ModelError::malformed_chat_record(format!(
                "negative time {}",
                parsed.time
            )));
        }
        Ok(Self::new(parsed.text, parsed.time))
    }
}
