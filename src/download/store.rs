//! Durable content store.
//!
//! # Responsibilities
//! - Resolve store paths (`<root>/models/<subdir>/<file>`)
//! - Create directories, treating concurrent creation as success
//! - Publish fully written files under their final name
//!
//! # Design Decisions
//! - Writers stage into a uniquely named hidden file in the destination
//!   directory and rename it into place once synced, so a partially written
//!   file is never visible under its final name
//! - The directory itself is synced after the rename (commit point)

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::download::job::ModelDir;

/// Folder under the root holding model subdirectories.
pub const MODELS_DIR: &str = "models";

/// Handle on the durable directory tree.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join(MODELS_DIR)
    }

    pub fn subdir_path(&self, subdir: ModelDir) -> PathBuf {
        self.models_dir().join(subdir.as_str())
    }

    /// Create `<root>/<folder>` for each top-level folder and every model subdirectory.
    pub async fn bootstrap(&self, folders: &[String]) -> io::Result<()> {
        for folder in folders {
            ensure_dir(&self.root.join(folder)).await?;
        }
        for subdir in ModelDir::ALL {
            ensure_dir(&self.subdir_path(subdir)).await?;
        }
        Ok(())
    }

    /// Start staging a new file that will be published at `destination`.
    pub async fn stage(&self, destination: &Path) -> io::Result<StagedFile> {
        let parent = destination
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"))?;
        let name = destination
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"))?;

        let temp_path = parent.join(format!(".{}.{}.part", name, uuid::Uuid::new_v4().simple()));
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;

        Ok(StagedFile {
            file: Some(file),
            temp_path,
            destination: destination.to_path_buf(),
            written: 0,
            armed: true,
        })
    }
}

/// Create a directory and its parents; an existing directory is success.
pub async fn ensure_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path).await
}

/// A file being written into the store but not yet published.
///
/// Until [`StagedFile::publish`] renames it into place, dropping the staged
/// file removes the hidden temporary.
#[derive(Debug)]
pub struct StagedFile {
    file: Option<fs::File>,
    temp_path: PathBuf,
    destination: PathBuf,
    written: u64,
    /// The temporary still exists and belongs to us.
    armed: bool,
}

impl StagedFile {
    /// Append a chunk.
    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "staged file already closed"))?;
        file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Flush, sync, rename into place and sync the directory.
    ///
    /// Returns the published path and its size on disk.
    pub async fn publish(mut self) -> io::Result<(PathBuf, u64)> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }

        fs::rename(&self.temp_path, &self.destination).await?;
        self.armed = false;
        sync_parent(&self.destination).await?;

        let size = fs::metadata(&self.destination).await?.len();
        Ok((self.destination.clone(), size))
    }

    /// Remove the temporary file.
    pub async fn discard(mut self) {
        drop(self.file.take());
        self.armed = false;
        if let Err(e) = fs::remove_file(&self.temp_path).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.temp_path.display(), error = %e, "Failed to remove partial download");
            }
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        drop(self.file.take());
        match std::fs::remove_file(&self.temp_path) {
            Ok(()) => tracing::debug!(path = %self.temp_path.display(), "Removed abandoned partial download"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.temp_path.display(), error = %e, "Failed to remove partial download")
            }
        }
    }
}

#[cfg(unix)]
async fn sync_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::File::open(parent).await?.sync_all().await?;
    }
    Ok(())
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_creates_layout_and_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let folders = vec!["models".to_string(), "output".to_string()];

        store.bootstrap(&folders).await.unwrap();
        store.bootstrap(&folders).await.unwrap();

        assert!(dir.path().join("output").is_dir());
        for subdir in ModelDir::ALL {
            assert!(store.subdir_path(subdir).is_dir());
        }
    }

    #[tokio::test]
    async fn staged_file_invisible_until_published() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let destination = dir.path().join("model.bin");

        let mut staged = store.stage(&destination).await.unwrap();
        staged.write(b"hello").await.unwrap();
        staged.write(b" world").await.unwrap();
        assert!(!destination.exists());
        assert!(staged.temp_path().exists());

        let (path, size) = staged.publish().await.unwrap();
        assert_eq!(path, destination);
        assert_eq!(size, 11);
        assert_eq!(std::fs::read(&destination).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn discard_removes_temporary() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let destination = dir.path().join("model.bin");

        let mut staged = store.stage(&destination).await.unwrap();
        staged.write(b"partial").await.unwrap();
        let temp = staged.temp_path().to_path_buf();
        staged.discard().await;

        assert!(!temp.exists());
        assert!(!destination.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn dropping_unpublished_file_removes_temporary() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let destination = dir.path().join("model.bin");

        let mut staged = store.stage(&destination).await.unwrap();
        staged.write(b"half").await.unwrap();
        let temp = staged.temp_path().to_path_buf();
        assert!(temp.exists());
        drop(staged);

        assert!(!temp.exists());
        assert!(!destination.exists());

        let mut staged = store.stage(&destination).await.unwrap();
        staged.write(b"whole").await.unwrap();
        staged.publish().await.unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"whole");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn concurrent_ensure_dir_never_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("models").join("vae");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let target = target.clone();
                tokio::spawn(async move { ensure_dir(&target).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(target.is_dir());
    }
}
