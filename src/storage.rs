use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

/// Destination for processed avatar files.
#[async_trait]
pub trait AvatarStorage: Send + Sync {
    /// Moves `src` into storage under `filename` and returns its public relative URL.
    async fn put_file(&self, src: &Path, filename: &str) -> anyhow::Result<String>;
    async fn delete_file(&self, filename: &str) -> anyhow::Result<()>;
}

/// Avatars kept in a directory that is served statically under `url_prefix`.
#[derive(Clone)]
pub struct LocalAvatarStorage {
    dir: PathBuf,
    url_prefix: String,
}

impl LocalAvatarStorage {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create avatars dir {}", self.dir.display()))
    }
}

#[async_trait]
impl AvatarStorage for LocalAvatarStorage {
    async fn put_file(&self, src: &Path, filename: &str) -> anyhow::Result<String> {
        let dest = self.dir.join(filename);
        if let Err(e) = tokio::fs::rename(src, &dest).await {
            // rename cannot cross filesystems; fall back to copy + remove
            debug!(error = %e, src = %src.display(), "rename failed, copying instead");
            tokio::fs::copy(src, &dest)
                .await
                .with_context(|| format!("copy {} -> {}", src.display(), dest.display()))?;
            tokio::fs::remove_file(src)
                .await
                .with_context(|| format!("remove {}", src.display()))?;
        }
        Ok(format!("{}/{}", self.url_prefix, filename))
    }

    async fn delete_file(&self, filename: &str) -> anyhow::Result<()> {
        let path = self.dir.join(filename);
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("remove {}", path.display()))
    }
}
