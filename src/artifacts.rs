//! On-disk artifact storage.
//!
//! One file per cache key under a fixed root directory, written with plain
//! overwrite. There is no atomic rename: a reader racing a writer can observe
//! a partial file if the underlying write is not atomic at the storage layer.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use tokio::fs;

use crate::keys::PageKey;

/// Errors from the artifact storage backend.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("cache key does not map to a storable path")]
    InvalidKey,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Filesystem-backed storage for rendered page artifacts.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Initialise storage rooted at the provided directory, creating it if
    /// necessary.
    pub fn new(root: PathBuf) -> Result<Self, ArtifactError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path the artifact for `key` is stored at.
    pub fn path_for(&self, key: &PageKey) -> Result<PathBuf, ArtifactError> {
        let relative = key.artifact_rel().ok_or(ArtifactError::InvalidKey)?;
        Ok(self.root.join(relative))
    }

    /// Persist the rendered bytes for `key`, overwriting any previous
    /// artifact and creating missing intermediate directories.
    pub async fn write(&self, key: &PageKey, bytes: &[u8]) -> Result<PathBuf, ArtifactError> {
        let absolute = self.path_for(key)?;

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&absolute, bytes).await?;
        Ok(absolute)
    }

    /// Read a previously persisted artifact into memory.
    pub async fn read(&self, path: &Path) -> Result<Bytes, ArtifactError> {
        let data = fs::read(path).await?;
        Ok(Bytes::from(data))
    }
}
