//! The backup storage seam.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

/// Destination for archived session files.
#[async_trait]
pub trait BackupStorage: Send + Sync {
    /// Upload the file at `path` under `destination` (a key prefix).
    ///
    /// Returns the full object key.
    async fn upload(&self, path: &Path, destination: &str) -> StorageResult<String>;
}

/// Object key for `path` under the `destination` prefix.
pub fn object_key(path: &Path, destination: &str) -> StorageResult<String> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::invalid_key(path.display().to_string()))?;

    let prefix = destination.trim_matches('/');
    if prefix.is_empty() {
        Ok(file_name.to_string())
    } else {
        Ok(format!("{}/{}", prefix, file_name))
    }
}

/// Content type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("flv") => "video/x-flv",
        Some("ts") => "video/mp2t",
        Some("json") => "application/json",
        Some("jsonl") => "application/jsonl",
        Some("txt") | Some("log") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_joins_prefix() {
        let key = object_key(Path::new("/data/merged/1_x_merged.mp4"), "archives/").unwrap();
        assert_eq!(key, "archives/1_x_merged.mp4");
        let key = object_key(Path::new("danmu.jsonl"), "/archives/1_x/").unwrap();
        assert_eq!(key, "archives/1_x/danmu.jsonl");
        assert_eq!(object_key(Path::new("a.mp4"), "").unwrap(), "a.mp4");
    }

    #[test]
    fn test_object_key_requires_file_name() {
        assert!(object_key(Path::new("/"), "archives").is_err());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("danmu.jsonl")), "application/jsonl");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }
}
