//! Storage collaborator
//!
//! Vaults only ever touch their files through [`Storage`]. The layer below is
//! expected to handle confidentiality; nothing here encrypts. [`FsStorage`]
//! maps storage paths onto a directory of the host filesystem.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// One entry returned by [`Storage::list_directory`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File or directory name, without its parent path
    pub name: String,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

/// POSIX-like file interface used by vaults
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a whole file
    async fn read(&self, path: &Path) -> StorageResult<Vec<u8>>;

    /// Replace a whole file; readers see either the old or the new content
    async fn write(&self, path: &Path, contents: &[u8]) -> StorageResult<()>;

    /// Delete a file
    async fn delete(&self, path: &Path) -> StorageResult<()>;

    /// Delete a directory and everything below it
    async fn remove_dir_all(&self, path: &Path) -> StorageResult<()>;

    /// Check whether a path exists
    async fn exists(&self, path: &Path) -> StorageResult<bool>;

    /// Create a directory
    async fn mkdir(&self, path: &Path, recursive: bool) -> StorageResult<()>;

    /// List the direct children of a directory
    async fn list_directory(&self, path: &Path) -> StorageResult<Vec<DirEntry>>;

    /// Location of `path` on the host filesystem; the history log lives there
    fn host_path(&self, path: &Path) -> PathBuf;
}

/// Storage rooted at a host directory
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Create storage rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn read(&self, path: &Path) -> StorageResult<Vec<u8>> {
        let full = self.resolve(path);
        tokio::fs::read(&full)
            .await
            .map_err(|e| StorageError::io(full, e))
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> StorageResult<()> {
        let full = self.resolve(path);
        let parent = full
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        let contents = contents.to_vec();

        // Write beside the target and rename over it so the replace is atomic.
        tokio::task::spawn_blocking(move || {
            let mut tmp = tempfile::Builder::new()
                .prefix(".tmp")
                .tempfile_in(&parent)
                .map_err(|e| StorageError::io(&parent, e))?;
            tmp.write_all(&contents)
                .and_then(|()| tmp.as_file().sync_all())
                .map_err(|e| StorageError::io(tmp.path(), e))?;
            tmp.persist(&full)
                .map_err(|e| StorageError::io(&full, e.error))?;
            debug!(path = %full.display(), bytes = contents.len(), "wrote file");
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    async fn delete(&self, path: &Path) -> StorageResult<()> {
        let full = self.resolve(path);
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| StorageError::io(full, e))
    }

    async fn remove_dir_all(&self, path: &Path) -> StorageResult<()> {
        let full = self.resolve(path);
        tokio::fs::remove_dir_all(&full)
            .await
            .map_err(|e| StorageError::io(full, e))
    }

    async fn exists(&self, path: &Path) -> StorageResult<bool> {
        let full = self.resolve(path);
        tokio::fs::try_exists(&full)
            .await
            .map_err(|e| StorageError::io(full, e))
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> StorageResult<()> {
        let full = self.resolve(path);
        let result = if recursive {
            tokio::fs::create_dir_all(&full).await
        } else {
            tokio::fs::create_dir(&full).await
        };
        result.map_err(|e| StorageError::io(full, e))
    }

    async fn list_directory(&self, path: &Path) -> StorageResult<Vec<DirEntry>> {
        let full = self.resolve(path);
        let mut reader = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| StorageError::io(&full, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&full, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StorageError::io(entry.path(), e))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        Ok(entries)
    }

    fn host_path(&self, path: &Path) -> PathBuf {
        self.resolve(path)
    }
}
