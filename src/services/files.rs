use crate::error::{AppError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use time::OffsetDateTime;

/// Narrow seam over binary storage for voice clips and images.
#[async_trait]
pub trait FileStore: Send + Sync + std::fmt::Debug + 'static {
    /// Persists the bytes and returns the stored path reference.
    async fn save(&self, filename: &str, bytes: Bytes) -> Result<String>;

    /// Removes a stored file. Callers log failures and move on; a missing
    /// file must never block record deletion.
    async fn unlink(&self, path: &str) -> anyhow::Result<()>;
}

/// Disk-backed store rooted at the configured upload directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Keeps the original name readable while stripping anything that could
    /// escape the upload directory.
    fn sanitize(filename: &str) -> String {
        let cleaned: String = filename
            .chars()
            .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        if cleaned.is_empty() { "upload".to_string() } else { cleaned }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, filename: &str, bytes: Bytes) -> Result<String> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to create upload directory");
            AppError::Internal
        })?;

        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let stored_name = format!("{millis}-{}", Self::sanitize(filename));
        let path = self.root.join(stored_name);

        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to write upload");
            AppError::Internal
        })?;

        Ok(path.to_string_lossy().into_owned())
    }

    async fn unlink(&self, path: &str) -> anyhow::Result<()> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_unlink_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());

        let path = store.save("clip one.m4a", Bytes::from_static(b"audio")).await.unwrap();
        assert!(path.ends_with("clip_one.m4a"));
        assert_eq!(std::fs::read(&path).unwrap(), b"audio");

        store.unlink(&path).await.unwrap();
        assert!(!std::path::Path::new(&path).exists());

        // Second unlink surfaces an error the caller is expected to swallow.
        assert!(store.unlink(&path).await.is_err());
    }

    #[test]
    fn sanitize_strips_separators() {
        assert_eq!(LocalFileStore::sanitize("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(LocalFileStore::sanitize(""), "upload");
    }
}
