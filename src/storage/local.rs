//! Local filesystem helpers and the local directory feed target.
//!
//! ## Layout
//!
//! ```text
//! {root}/
//! └── {feed path}          # e.g. posts/posts.csv
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::FeedTarget;

/// Ensure parent directory exists.
async fn ensure_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Write bytes atomically (write to temp, then rename).
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_dir(path).await?;

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Read bytes, returning None if file doesn't exist.
pub async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Write pretty JSON atomically.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).await
}

/// Read JSON, returning None if the file doesn't exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_optional(path).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Copies feeds into a directory on this machine.
#[derive(Debug, Clone)]
pub struct LocalTarget {
    root_dir: PathBuf,
}

impl LocalTarget {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a relative feed name.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root_dir.join(name)
    }
}

#[async_trait]
impl FeedTarget for LocalTarget {
    fn describe(&self) -> String {
        format!("file://{}", self.root_dir.display())
    }

    async fn deliver(&self, file: &Path, name: &str) -> Result<()> {
        let bytes = tokio::fs::read(file).await?;
        let dest = self.path(name);
        write_atomic(&dest, &bytes).await?;
        log::debug!("Copied {:?} to {:?}", file, dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/test.txt");

        write_atomic(&path, b"hello").await.unwrap();
        assert_eq!(read_optional(&path).await.unwrap(), Some(b"hello".to_vec()));
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        assert!(read_optional(&tmp.path().join("nope.txt")).await.unwrap().is_none());
        let json: Option<Vec<u32>> = read_json(&tmp.path().join("nope.json")).await.unwrap();
        assert!(json.is_none());
    }

    #[tokio::test]
    async fn test_deliver_copies_into_subdirectory() {
        let source = TempDir::new().unwrap();
        let feed = source.path().join("posts.csv");
        tokio::fs::write(&feed, "ID,Title\n00001,Hello\n").await.unwrap();

        let dest = TempDir::new().unwrap();
        let target = LocalTarget::new(dest.path());
        target.deliver(&feed, "posts/posts.csv").await.unwrap();

        let copied = tokio::fs::read_to_string(target.path("posts/posts.csv"))
            .await
            .unwrap();
        assert_eq!(copied, "ID,Title\n00001,Hello\n");
        assert!(target.describe().starts_with("file://"));
    }

    #[tokio::test]
    async fn test_deliver_missing_source_fails() {
        let dest = TempDir::new().unwrap();
        let target = LocalTarget::new(dest.path());
        let result = target.deliver(Path::new("/nonexistent/feed.csv"), "feed.csv").await;
        assert!(matches!(result, Err(AppError::Io(_))));
    }
}
