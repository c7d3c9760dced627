//! Filesystem helpers for session directories.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::MediaResult;

/// Delete every file in `dir`, then the directory itself.
///
/// A directory that does not exist is treated as already removed.
pub async fn remove_dir_with_files(dir: impl AsRef<Path>) -> MediaResult<()> {
    let dir = dir.as_ref();
    if !fs::try_exists(dir).await? {
        return Ok(());
    }

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
    }

    fs::remove_dir(dir).await?;
    tracing::debug!("Removed directory {}", dir.display());
    Ok(())
}

/// Regular files directly inside `dir` whose extension matches, sorted by name.
pub async fn list_files_with_extension(
    dir: impl AsRef<Path>,
    extension: &str,
) -> MediaResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir.as_ref()).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if matches && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_remove_dir_with_files() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("session");
        fs::create_dir_all(dir.join("nested")).await.unwrap();
        fs::write(dir.join("a.mp4"), b"a").await.unwrap();
        fs::write(dir.join("nested").join("b.mp4"), b"b").await.unwrap();

        remove_dir_with_files(&dir).await.unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_remove_missing_dir_is_ok() {
        let root = TempDir::new().unwrap();
        remove_dir_with_files(root.path().join("gone")).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_files_with_extension() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("b.flv"), b"").await.unwrap();
        fs::write(root.path().join("a.FLV"), b"").await.unwrap();
        fs::write(root.path().join("c.ts"), b"").await.unwrap();
        fs::create_dir(root.path().join("d.flv")).await.unwrap();

        let files = list_files_with_extension(root.path(), "flv").await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.FLV", "b.flv"]);
    }
}
