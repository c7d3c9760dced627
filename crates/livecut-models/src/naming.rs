//! Filename conventions shared by capture, processing and upload.
//!
//! Every session is identified on disk by a tag of the form
//! `{room_id}_{YYYY-MM-DD_HH-MM-SS}` built from the session start time.
//! Segment files written by the capture process carry their own start time
//! in the same format, which is how the timeline is rebuilt regardless of
//! the order the filesystem lists them in.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

use crate::error::{ModelError, ModelResult};

/// strftime pattern used in every session and segment name.
pub const SESSION_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Extension of raw capture segments.
pub const RAW_SEGMENT_EXTENSION: &str = "flv";

/// Extension of container-converted segments.
pub const CONVERTED_SEGMENT_EXTENSION: &str = "ts";

/// Build the session tag for a room and a session start time.
pub fn session_tag(room_id: &str, started_at: &DateTime<Local>) -> String {
    format!("{}_{}", room_id, started_at.format(SESSION_TIME_FORMAT))
}

/// Name of a raw segment file started at `at`.
pub fn segment_file_name(room_id: &str, at: &DateTime<Local>) -> String {
    format!(
        "{}_{}.{}",
        room_id,
        at.format(SESSION_TIME_FORMAT),
        RAW_SEGMENT_EXTENSION
    )
}

/// Parse the start time embedded in a segment filename.
///
/// Accepts `ROOMID_YYYY-MM-DD_HH-MM-SS` followed by any suffix and extension.
pub fn parse_segment_start(file_name: &str) -> ModelResult<DateTime<Local>> {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ModelError::invalid_segment_name(file_name))?;

    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 3 {
        return Err(ModelError::invalid_segment_name(file_name));
    }

    let joined = format!("{} {}", parts[1], parts[2]);
    let naive = NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H-%M-%S")
        .map_err(|_| ModelError::invalid_segment_name(file_name))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| ModelError::invalid_segment_name(file_name))
}

/// Replace characters that are not safe in a filename component.
pub fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Name of a highlight clip: unique per session through the merged-file offset.
pub fn clip_file_name(tag: &str, offset_secs: u64, tags: &[String]) -> String {
    // Underscores delimit the name; the tag hint must not contain any.
    let hint = sanitize_component(&tags.join(" ")).replace('_', "-");
    format!("{}_{:012}_{}.mp4", tag, offset_secs, hint)
}

/// Name of the `index`-th fixed-length chunk of the merged recording.
pub fn split_file_name(tag: &str, index: usize) -> String {
    format!("{}_{:04}.mp4", tag, index)
}

/// Title hint of a clip file: the tag list after the last underscore.
pub fn clip_title_from_file_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    stem.rsplit('_').next().unwrap_or(stem).to_string()
}

/// On-disk layout of one recording session under the data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    /// Raw and converted capture segments
    pub record_dir: PathBuf,
    /// Chat logs written by the chat capture
    pub danmu_dir: PathBuf,
    /// Reconciled, concatenated recording
    pub merged_file: PathBuf,
    /// Highlight clips
    pub outputs_dir: PathBuf,
    /// Fixed-length chunks of the merged recording
    pub splits_dir: PathBuf,
}

impl SessionPaths {
    /// Build the layout for a session tag under `data_root`.
    pub fn new(data_root: impl AsRef<Path>, tag: &str) -> Self {
        let data = data_root.as_ref().join("data");
        Self {
            record_dir: data.join("records").join(tag),
            danmu_dir: data.join("danmu").join(tag),
            merged_file: data.join("merged").join(format!("{}_merged.mp4", tag)),
            outputs_dir: data.join("outputs").join(tag),
            splits_dir: data.join("splits").join(tag),
        }
    }

    /// Directories that must exist before capture starts.
    pub fn directories(&self) -> Vec<&Path> {
        let mut dirs = vec![
            self.record_dir.as_path(),
            self.danmu_dir.as_path(),
            self.outputs_dir.as_path(),
            self.splits_dir.as_path(),
        ];
        if let Some(parent) = self.merged_file.parent() {
            dirs.push(parent);
        }
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_segment_start() {
        let t = parse_segment_start("5561470_2021-11-18_00-18-00.flv").unwrap();
        assert_eq!((t.year(), t.month(), t.day()), (2021, 11, 18));
        assert_eq!((t.hour(), t.minute(), t.second()), (0, 18, 0));
    }

    #[test]
    fn test_parse_segment_start_with_suffix() {
        let t = parse_segment_start("42_2024-03-01_21-05-09_part2.ts").unwrap();
        assert_eq!((t.hour(), t.minute(), t.second()), (21, 5, 9));
    }

    #[test]
    fn test_parse_segment_start_rejects_garbage() {
        assert!(parse_segment_start("readme.txt").is_err());
        assert!(parse_segment_start("42_2024-03-01.flv").is_err());
        assert!(parse_segment_start("42_yesterday_noon.flv").is_err());
    }

    #[test]
    fn test_segment_name_round_trips_through_parser() {
        let at = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let name = segment_file_name("777", &at);
        assert_eq!(name, "777_2024-01-02_03-04-05.flv");
        assert_eq!(parse_segment_start(&name).unwrap(), at);
    }

    #[test]
    fn test_session_paths_layout() {
        let at = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let tag = session_tag("777", &at);
        let paths = SessionPaths::new("/srv", &tag);

        assert_eq!(paths.record_dir, PathBuf::from("/srv/data/records/777_2024-01-02_03-04-05"));
        assert_eq!(
            paths.merged_file,
            PathBuf::from("/srv/data/merged/777_2024-01-02_03-04-05_merged.mp4")
        );
        assert_eq!(paths.directories().len(), 5);
    }

    #[test]
    fn test_clip_file_name_is_sanitized() {
        let name = clip_file_name("1_2024-01-01_00-00-00", 125, &["a/b".into(), "x_y".into()]);
        assert_eq!(name, "1_2024-01-01_00-00-00_000000000125_a-b x-y.mp4");
        assert_eq!(clip_title_from_file_name(&name), "a-b x-y");
    }

    #[test]
    fn test_split_file_name() {
        assert_eq!(split_file_name("1_x", 0), "1_x_0000.mp4");
        assert_eq!(split_file_name("1_x", 12), "1_x_0012.mp4");
    }
}
