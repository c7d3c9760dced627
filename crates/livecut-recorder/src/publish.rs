//! Publication of session outputs.
//!
//! Highlight clips and record chunks are published as two separate
//! artifacts, each made of one part per file. The platform upload itself
//! is delegated to a [`PublicationService`]; [`Publisher`] decides what to
//! publish, with which metadata, and how often to retry.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use livecut_models::naming::clip_title_from_file_name;
use livecut_models::SessionContext;

use crate::config::{RoomConfig, UploaderCommand};
use crate::error::{RecorderError, RecorderResult};
use crate::metrics;
use crate::pipeline::SessionOutputs;
use crate::retry::{retry_async, RetryPolicy};

/// Files smaller than this are not published.
pub const MIN_PART_BYTES: u64 = 1024 * 1024;

/// strftime pattern substituted for `{date}` in titles and descriptions.
pub const DATE_FORMAT: &str = "%Y年%m月%d日";

/// One uploaded file of an artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoPart {
    pub path: PathBuf,
    pub title: String,
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicationMetadata {
    pub title: String,
    pub tid: u32,
    pub tags: Vec<String>,
    pub desc: String,
    pub copyright: u8,
    pub source: String,
}

/// Uploads parts to the publishing platform.
#[async_trait]
pub trait PublicationService: Send + Sync {
    /// Publish a new artifact and return its public id.
    async fn publish(
        &self,
        parts: &[VideoPart],
        metadata: &PublicationMetadata,
    ) -> RecorderResult<String>;

    /// Append parts to an already published artifact.
    async fn edit(&self, public_id: &str, parts: &[VideoPart]) -> RecorderResult<()>;
}

#[derive(Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Manifest<'a> {
    Publish {
        account: &'a str,
        metadata: &'a PublicationMetadata,
        parts: &'a [VideoPart],
    },
    Edit {
        account: &'a str,
        public_id: &'a str,
        parts: &'a [VideoPart],
    },
}

/// [`PublicationService`] backed by an external uploader program.
///
/// Each call writes a JSON manifest to a temporary file and runs the
/// program with its path. A publish succeeds when the program exits
/// cleanly and its stdout contains a public id.
pub struct CommandPublisher {
    command: UploaderCommand,
    id_pattern: Regex,
    account: String,
}

impl CommandPublisher {
    pub fn new(command: UploaderCommand, account: impl Into<String>) -> RecorderResult<Self> {
        let id_pattern = Regex::new(&command.id_pattern)
            .map_err(|e| RecorderError::config(format!("invalid uploader id_pattern: {}", e)))?;
        Ok(Self {
            command,
            id_pattern,
            account: account.into(),
        })
    }

    fn args_for(&self, manifest: &Path) -> Vec<String> {
        let manifest = manifest.to_string_lossy();
        let mut mentioned = false;
        let mut args: Vec<String> = self
            .command
            .args
            .iter()
            .map(|arg| {
                mentioned |= arg.contains("{manifest}");
                arg.replace("{manifest}", &manifest)
            })
            .collect();
        if !mentioned {
            args.push(manifest.to_string());
        }
        args
    }

    async fn invoke(&self, manifest: &Manifest<'_>) -> RecorderResult<String> {
        let file = tempfile::Builder::new()
            .prefix("livecut-manifest-")
            .suffix(".json")
            .tempfile()?;
        tokio::fs::write(file.path(), serde_json::to_vec_pretty(manifest)?).await?;

        let output = Command::new(&self.command.program)
            .args(self.args_for(file.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                RecorderError::publication(format!(
                    "cannot run uploader {:?}: {}",
                    self.command.program, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(10).collect();
            debug!(stderr = %stderr, "Uploader failed");
            return Err(RecorderError::publication(format!(
                "uploader exited with {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join("\n")
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PublicationService for CommandPublisher {
    async fn publish(
        &self,
        parts: &[VideoPart],
        metadata: &PublicationMetadata,
    ) -> RecorderResult<String> {
        let stdout = self
            .invoke(&Manifest::Publish {
                account: &self.account,
                metadata,
                parts,
            })
            .await?;
        self.id_pattern
            .find(&stdout)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| RecorderError::publication("uploader printed no public id"))
    }

    async fn edit(&self, public_id: &str, parts: &[VideoPart]) -> RecorderResult<()> {
        self.invoke(&Manifest::Edit {
            account: &self.account,
            public_id,
            parts,
        })
        .await
        .map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Clips,
    Record,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Clips => "clips",
            ArtifactKind::Record => "record",
        }
    }
}

/// A published artifact and the local directory holding its files.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedArtifact {
    pub kind: ArtifactKind,
    pub public_id: String,
    pub source_dir: PathBuf,
    /// Delete `source_dir` once the artifact is publicly visible
    pub reclaim: bool,
}

/// Per-artifact upload settings.
#[derive(Debug, Clone)]
struct ArtifactSettings {
    enabled: bool,
    keep_after_upload: bool,
    title: String,
    tid: u32,
    tags: Vec<String>,
    desc: String,
}

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub room_id: String,
    pub copyright: u8,
    pub upload_by_edit: bool,
    pub max_retry: u32,
    pub retry_base_delay: Duration,
    pub min_part_bytes: u64,
    clips: ArtifactSettings,
    record: ArtifactSettings,
}

impl PublishSettings {
    pub fn for_room(room: &RoomConfig, upload_by_edit: bool, max_retry: u32) -> Self {
        let uploader = &room.uploader;
        Self {
            room_id: room.room_id.clone(),
            copyright: uploader.copyright,
            upload_by_edit,
            max_retry,
            retry_base_delay: Duration::from_secs(10),
            min_part_bytes: MIN_PART_BYTES,
            clips: ArtifactSettings {
                enabled: uploader.clips.upload_clips,
                keep_after_upload: uploader.clips.keep_clips_after_upload,
                title: uploader.clips.title.clone(),
                tid: uploader.clips.tid,
                tags: uploader.clips.tags.clone(),
                desc: uploader.clips.desc.clone(),
            },
            record: ArtifactSettings {
                enabled: uploader.record.upload_record,
                keep_after_upload: uploader.record.keep_record_after_upload,
                title: uploader.record.title.clone(),
                tid: uploader.record.tid,
                tags: uploader.record.tags.clone(),
                desc: uploader.record.desc.clone(),
            },
        }
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_min_part_bytes(mut self, bytes: u64) -> Self {
        self.min_part_bytes = bytes;
        self
    }
}

/// Publishes the clips and the record of finished sessions.
pub struct Publisher {
    service: Arc<dyn PublicationService>,
    settings: PublishSettings,
}

impl Publisher {
    pub fn new(service: Arc<dyn PublicationService>, settings: PublishSettings) -> Self {
        Self { service, settings }
    }

    /// Whether an enabled artifact of this session has files to publish.
    pub fn has_uploads(&self, outputs: &SessionOutputs) -> bool {
        (self.settings.clips.enabled && !outputs.clips.is_empty())
            || (self.settings.record.enabled && !outputs.splits.is_empty())
    }

    /// Publish every enabled artifact of a session.
    ///
    /// A failed artifact is logged and skipped; the others still publish.
    pub async fn publish_session(
        &self,
        ctx: &SessionContext,
        outputs: &SessionOutputs,
        display_name: &str,
    ) -> Vec<PublishedArtifact> {
        let mut published = Vec::new();
        let artifacts = [
            (ArtifactKind::Clips, &self.settings.clips, &outputs.clips, &ctx.paths.outputs_dir),
            (ArtifactKind::Record, &self.settings.record, &outputs.splits, &ctx.paths.splits_dir),
        ];

        for (kind, settings, files, source_dir) in artifacts {
            if !settings.enabled {
                continue;
            }
            match self
                .publish_artifact(ctx, kind, settings, files, display_name)
                .await
            {
                Ok(Some(public_id)) => {
                    metrics::record_publication(kind.as_str(), true);
                    info!(session = %ctx.tag, public_id = %public_id, "Published {}", kind.as_str());
                    published.push(PublishedArtifact {
                        kind,
                        public_id,
                        source_dir: source_dir.clone(),
                        reclaim: !settings.keep_after_upload && !self.settings.upload_by_edit,
                    });
                }
                Ok(None) => info!(session = %ctx.tag, "No {} parts to publish", kind.as_str()),
                Err(e) => {
                    metrics::record_publication(kind.as_str(), false);
                    warn!(session = %ctx.tag, "Publishing {} failed: {}", kind.as_str(), e);
                }
            }
        }
        published
    }

    async fn publish_artifact(
        &self,
        ctx: &SessionContext,
        kind: ArtifactKind,
        settings: &ArtifactSettings,
        files: &[PathBuf],
        display_name: &str,
    ) -> RecorderResult<Option<String>> {
        let date = ctx.started_at.format(DATE_FORMAT).to_string();
        let fill = |template: &str| template.replace("{date}", &date).replace("{title}", display_name);

        let parts = self.collect_parts(kind, files, &fill(&settings.desc)).await;
        if parts.is_empty() {
            return Ok(None);
        }

        let metadata = PublicationMetadata {
            title: fill(&settings.title),
            tid: settings.tid,
            tags: settings.tags.clone(),
            desc: fill(&settings.desc),
            copyright: self.settings.copyright,
            source: format!("https://live.bilibili.com/{}", self.settings.room_id),
        };

        let policy = RetryPolicy::new(format!("publish {}", kind.as_str()))
            .with_max_retries(self.settings.max_retry)
            .with_base_delay(self.settings.retry_base_delay);

        let (first, rest) = if self.settings.upload_by_edit {
            parts.split_at(1)
        } else {
            (parts.as_slice(), &[][..])
        };

        let public_id = retry_async(&policy, || self.service.publish(first, &metadata))
            .await
            .map_err(|exhausted| {
                RecorderError::publication(format!(
                    "{} after {} attempts",
                    exhausted.error, exhausted.attempts
                ))
            })?;

        for part in rest {
            let single = std::slice::from_ref(part);
            if let Err(exhausted) =
                retry_async(&policy, || self.service.edit(&public_id, single)).await
            {
                warn!(
                    public_id = %public_id,
                    "Appending {} failed after {} attempts: {}",
                    part.path.display(),
                    exhausted.attempts,
                    exhausted.error
                );
            }
        }
        Ok(Some(public_id))
    }

    async fn collect_parts(&self, kind: ArtifactKind, files: &[PathBuf], desc: &str) -> Vec<VideoPart> {
        let mut files = files.to_vec();
        files.sort();

        let mut parts = Vec::new();
        for path in files {
            let size = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!("Skipping part {}: {}", path.display(), e);
                    continue;
                }
            };
            if size < self.settings.min_part_bytes {
                debug!("Skipping small part {} ({} bytes)", path.display(), size);
                continue;
            }
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let title = match kind {
                ArtifactKind::Clips => clip_title_from_file_name(&file_name),
                ArtifactKind::Record => file_name,
            };
            parts.push(VideoPart {
                path,
                title,
                desc: desc.to_string(),
            });
        }
        parts
    }
}
