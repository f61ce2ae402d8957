//! File store abstraction and its local filesystem implementation
//!
//! The engine asks the file store whether a destination exists and when it
//! was last modified. It also moves staged payloads into place, stamps
//! destinations with the server's timestamp and discards staged payloads
//! that could not be moved.

use super::error::{DownloadError, FileOperation, Result};
use async_trait::async_trait;
use filetime::FileTime;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;

/// Local storage collaborator used by the planner and executor
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;

    async fn modification_time(&self, path: &Path) -> Option<SystemTime>;

    /// Move `temp_path` over `dest_path`, replacing any previous file
    async fn atomic_replace(&self, temp_path: &Path, dest_path: &Path) -> Result<()>;

    async fn set_modification_time(&self, path: &Path, modified: SystemTime) -> Result<()>;

    /// Delete a file, such as a staged payload left behind by a failed replace
    async fn remove(&self, path: &Path) -> Result<()>;
}

/// File store backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).await.is_ok()
    }

    async fn modification_time(&self, path: &Path) -> Option<SystemTime> {
        fs::metadata(path).await.ok()?.modified().ok()
    }

    async fn atomic_replace(&self, temp_path: &Path, dest_path: &Path) -> Result<()> {
        if let Some(parent) = dest_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::file_system(parent, FileOperation::CreateDir, e))?;
        }

        match fs::rename(temp_path, dest_path).await {
            Ok(()) => {
                debug!("Atomically renamed {} to {}", temp_path.display(), dest_path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                replace_across_devices(temp_path, dest_path).await
            }
            Err(e) => Err(DownloadError::file_system(dest_path, FileOperation::Move, e)),
        }
    }

    async fn set_modification_time(&self, path: &Path, modified: SystemTime) -> Result<()> {
        let target = path.to_path_buf();
        let mtime = FileTime::from_system_time(modified);

        let outcome = tokio::task::spawn_blocking(move || filetime::set_file_mtime(&target, mtime))
            .await
            .map_err(io::Error::other)
            .and_then(|result| result);

        outcome.map_err(|e| DownloadError::file_system(path, FileOperation::SetModified, e))
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .await
            .map_err(|e| DownloadError::file_system(path, FileOperation::Delete, e))
    }
}

/// Create a temporary file path next to the destination
///
/// The sibling lives on the destination's filesystem, so the final rename
/// stays atomic.
pub fn create_temp_path(dest_path: &Path) -> PathBuf {
    let mut name = dest_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest_path.with_file_name(name)
}

async fn replace_across_devices(temp_path: &Path, dest_path: &Path) -> Result<()> {
    let sibling = create_temp_path(dest_path);
    debug!(
        "Staging area is on another device, copying {} via {}",
        temp_path.display(),
        sibling.display()
    );

    if let Err(e) = fs::copy(temp_path, &sibling).await {
        let _ = fs::remove_file(&sibling).await;
        return Err(DownloadError::file_system(&sibling, FileOperation::Copy, e));
    }

    if let Err(e) = fs::rename(&sibling, dest_path).await {
        let _ = fs::remove_file(&sibling).await;
        return Err(DownloadError::file_system(dest_path, FileOperation::Move, e));
    }

    fs::remove_file(temp_path)
        .await
        .map_err(|e| DownloadError::file_system(temp_path, FileOperation::Delete, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_atomic_replace_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let staged = dir.path().join("staged.bin");
        std::fs::write(&staged, b"fresh").unwrap();

        let dest = dir.path().join("nested").join("deeper").join("file.bin");
        let store = LocalFileStore::new();
        store.atomic_replace(&staged, &dest).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"fresh");
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_atomic_replace_overwrites_existing() {
        let dir = tempdir().unwrap();
        let staged = dir.path().join("staged.bin");
        let dest = dir.path().join("file.bin");
        std::fs::write(&staged, b"new contents").unwrap();
        std::fs::write(&dest, b"old").unwrap();

        LocalFileStore::new().atomic_replace(&staged, &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new contents");
    }

    #[tokio::test]
    async fn test_atomic_replace_missing_source() {
        let dir = tempdir().unwrap();
        let error = LocalFileStore::new()
            .atomic_replace(&dir.path().join("gone"), &dir.path().join("file.bin"))
            .await
            .unwrap_err();

        match error {
            DownloadError::FileSystem { operation, .. } => assert_eq!(operation, FileOperation::Move),
            other => panic!("Expected FileSystem error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_modification_time_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stamped.txt");
        std::fs::write(&path, b"x").unwrap();

        let store = LocalFileStore::new();
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480);
        store.set_modification_time(&path, stamp).await.unwrap();

        assert!(store.exists(&path).await);
        assert_eq!(store.modification_time(&path).await, Some(stamp));
    }

    #[tokio::test]
    async fn test_missing_file_facts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.txt");
        let store = LocalFileStore::new();

        assert!(!store.exists(&path).await);
        assert_eq!(store.modification_time(&path).await, None);
        assert!(store.set_modification_time(&path, SystemTime::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_deletes_and_reports_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("staged.bin");
        std::fs::write(&path, b"leftover").unwrap();

        let store = LocalFileStore::new();
        store.remove(&path).await.unwrap();
        assert!(!path.exists());

        match store.remove(&path).await.unwrap_err() {
            DownloadError::FileSystem { operation, .. } => assert_eq!(operation, FileOperation::Delete),
            other => panic!("Expected FileSystem error, got {other:?}"),
        }
    }

    #[test]
    fn test_temp_path_keeps_extension() {
        let path = create_temp_path(Path::new("/data/archive.tar.gz"));
        assert_eq!(path, PathBuf::from("/data/archive.tar.gz.part"));
    }
}
