use crate::error::PersistenceError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid object name '{0}'")]
    InvalidName(String),
    #[error("Failed to write blob: {0}")]
    Io(#[from] std::io::Error),
}

/// Object store addressed by bucket and object name.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bucket: &str, filename: &str, bytes: &[u8]) -> Result<(), PersistenceError>;
}

/// Filesystem-backed object store: one directory per bucket under `root`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, filename: &str) -> Result<PathBuf, BlobError> {
        for name in [bucket, filename] {
            if !is_plain_name(name) {
                return Err(BlobError::InvalidName(name.to_string()));
            }
        }
        Ok(self.root.join(bucket).join(filename))
    }

    async fn ensure_bucket(&self, bucket_dir: &Path) -> Result<(), BlobError> {
        if !tokio::fs::try_exists(bucket_dir).await? {
            tokio::fs::create_dir_all(bucket_dir).await?;
            tracing::info!(bucket = %bucket_dir.display(), "Created bucket");
        }
        Ok(())
    }

    pub async fn write(&self, bucket: &str, filename: &str, bytes: &[u8]) -> Result<PathBuf, BlobError> {
        let path = self.object_path(bucket, filename)?;
        self.ensure_bucket(&self.root.join(bucket)).await?;
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bucket: &str, filename: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
        let path = self.write(bucket, filename, bytes).await?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "Stored blob");
        Ok(())
    }
}
