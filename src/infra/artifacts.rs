//! Filesystem storage for compressed image artifacts.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::application::jobs::ArtifactStore;

/// Errors that can occur while interacting with the artifact directory.
#[derive(Debug, Error)]
pub enum ArtifactStorageError {
    #[error("invalid artifact path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ArtifactStorageError {
    /// I/O failures may clear up on retry; a bad path never will.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Filesystem-backed artifact storage rooted at a single directory.
#[derive(Debug)]
pub struct ArtifactStorage {
    root: PathBuf,
}

impl ArtifactStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Write `data` under `reference`, replacing any previous artifact.
    ///
    /// Bytes land in a sibling temporary file first and are renamed into
    /// place, so readers never observe a partially written artifact.
    pub async fn write(&self, reference: &str, data: &[u8]) -> Result<(), ArtifactStorageError> {
        let absolute = self.resolve(reference)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temporary = absolute.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let result = async {
            let mut file = fs::File::create(&temporary).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temporary, &absolute).await
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&temporary).await;
            return Err(ArtifactStorageError::Io(err));
        }
        Ok(())
    }

    /// Attempt to read the stored artifact into memory.
    pub async fn read(&self, reference: &str) -> Result<Bytes, ArtifactStorageError> {
        let absolute = self.resolve(reference)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Resolve the absolute filesystem path for a stored artifact.
    fn resolve(&self, reference: &str) -> Result<PathBuf, ArtifactStorageError> {
        let relative = Path::new(reference);
        if reference.is_empty()
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(ArtifactStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for ArtifactStorage {
    async fn store(&self, reference: &str, data: &[u8]) -> Result<(), ArtifactStorageError> {
        self.write(reference, data).await
    }
}
