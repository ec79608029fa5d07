//! Temporary artifacts backing in-progress downloads.
//!
//! Bytes are written to `<destination>.partial` in the destination's own
//! directory so the final rename never crosses filesystems. A sidecar
//! `<destination>.partial.lock` carries an exclusive OS lock for as long as
//! the owning [`TemporaryArtifact`] lives.

use std::ffi::OsString;
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{TransferError, TransferResult};

/// Suffix appended to the destination file name for the partial artifact.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Suffix appended to the destination file name for the lock file.
pub const LOCK_SUFFIX: &str = ".partial.lock";

/// Deterministic partial path for a destination.
pub fn partial_path_for(destination: &Path) -> PathBuf {
    with_suffix(destination, PARTIAL_SUFFIX)
}

/// Deterministic lock path for a destination.
pub fn lock_path_for(destination: &Path) -> PathBuf {
    with_suffix(destination, LOCK_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Exclusive ownership of a destination's partial file.
///
/// Dropping the token releases the lock and leaves the partial file where it
/// is, so a later call can resume from it.
#[derive(Debug)]
pub struct TemporaryArtifact {
    destination: PathBuf,
    partial: PathBuf,
    lock_path: PathBuf,
    lock: Option<File>,
}

impl TemporaryArtifact {
    /// Lock the artifact for `destination`, creating parent directories as needed.
    ///
    /// Fails fast with [`TransferError::ArtifactInUse`] if another transfer
    /// (in this process or another) holds the lock.
    pub fn acquire(destination: &Path) -> TransferResult<Self> {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| TransferError::filesystem("create_dir", parent, e))?;
        }

        let lock_path = lock_path_for(destination);
        let lock = lock_current(&lock_path)?;

        debug!(lock = %lock_path.display(), "Acquired artifact lock");
        Ok(Self {
            destination: destination.to_path_buf(),
            partial: partial_path_for(destination),
            lock_path,
            lock: Some(lock),
        })
    }

    /// Path of the partial file.
    pub fn path(&self) -> &Path {
        &self.partial
    }

    /// Final destination this artifact will be promoted to.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Bytes currently in the partial file (zero if it does not exist).
    pub async fn len(&self) -> TransferResult<u64> {
        match tokio::fs::metadata(&self.partial).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(TransferError::filesystem("stat", &self.partial, e)),
        }
    }

    /// Open the partial file for writing at `offset`.
    ///
    /// An offset of zero truncates; any other offset appends after checking
    /// the file really is that long.
    pub async fn open_at(&self, offset: u64) -> TransferResult<tokio::fs::File> {
        let mut options = tokio::fs::OpenOptions::new();
        options.create(true).write(true);
        if offset == 0 {
            options.truncate(true);
        } else {
            options.append(true);
        }
        let file = options
            .open(&self.partial)
            .await
            .map_err(|e| TransferError::filesystem("open_partial", &self.partial, e))?;

        if offset > 0 {
            let len = file
                .metadata()
                .await
                .map_err(|e| TransferError::filesystem("stat", &self.partial, e))?
                .len();
            if len < offset {
                let short = std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("partial file has {len} bytes, cannot resume at {offset}"),
                );
                return Err(TransferError::filesystem("resume", &self.partial, short));
            }
            if len > offset {
                file.set_len(offset)
                    .await
                    .map_err(|e| TransferError::filesystem("truncate", &self.partial, e))?;
            }
        }
        Ok(file)
    }

    /// Drop any bytes already written.
    pub async fn truncate(&self) -> TransferResult<()> {
        match tokio::fs::remove_file(&self.partial).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TransferError::filesystem("remove_partial", &self.partial, e)),
        }
    }

    /// Atomically move the partial file onto the destination.
    pub async fn promote(self) -> TransferResult<PathBuf> {
        tokio::fs::rename(&self.partial, &self.destination)
            .await
            .map_err(|e| TransferError::filesystem("rename", &self.destination, e))?;
        debug!(destination = %self.destination.display(), "Promoted artifact");
        Ok(self.destination.clone())
    }

    /// Delete the partial file and release the lock.
    pub async fn discard(self) -> TransferResult<()> {
        self.truncate().await
    }
}

/// Open and lock the file at `lock_path`, retrying until the locked handle
/// is still the file the path names.
///
/// A holder unlinks the lock file before unlocking it, so a waiter that
/// opened the old file ends up locking an orphan and must start over.
fn lock_current(lock_path: &Path) -> TransferResult<File> {
    loop {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path)
            .map_err(|e| TransferError::filesystem("open_lock", lock_path, e))?;

        match lock.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(TransferError::ArtifactInUse {
                    path: lock_path.to_path_buf(),
                });
            }
            Err(TryLockError::Error(e)) => {
                return Err(TransferError::filesystem("lock", lock_path, e));
            }
        }

        if refers_to(&lock, lock_path)
            .map_err(|e| TransferError::filesystem("stat_lock", lock_path, e))?
        {
            return Ok(lock);
        }
        debug!(lock = %lock_path.display(), "Lock file was replaced, retrying");
    }
}

/// Whether `path` still names the open file `file`.
#[cfg(unix)]
fn refers_to(file: &File, path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

// Lock files are never unlinked off unix, so the path cannot be replaced.
#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn refers_to(_file: &File, _path: &Path) -> std::io::Result<bool> {
    Ok(true)
}

impl Drop for TemporaryArtifact {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            // Unlink while still locked; waiters holding the old file notice
            // the path changed and reopen.
            #[cfg(unix)]
            if let Err(e) = std::fs::remove_file(&self.lock_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(lock = %self.lock_path.display(), error = %e, "Failed to remove artifact lock file");
                }
            }
            if let Err(e) = lock.unlock() {
                warn!(lock = %self.lock_path.display(), error = %e, "Failed to release artifact lock");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_paths_are_derived_from_destination() {
        let dest = PathBuf::from("/data/v5.0/live.parquet");
        assert_eq!(
            partial_path_for(&dest),
            PathBuf::from("/data/v5.0/live.parquet.partial")
        );
        assert_eq!(
            lock_path_for(&dest),
            PathBuf::from("/data/v5.0/live.parquet.partial.lock")
        );
    }

    #[test]
    fn second_acquire_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("train.parquet");

        let first = TemporaryArtifact::acquire(&dest).unwrap();
        let second = TemporaryArtifact::acquire(&dest);
        assert!(matches!(second, Err(TransferError::ArtifactInUse { .. })));

        drop(first);
        assert!(TemporaryArtifact::acquire(&dest).is_ok());
    }

    #[test]
    fn acquire_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("v5.0").join("nested").join("live.parquet");
        let artifact = TemporaryArtifact::acquire(&dest).unwrap();
        assert!(dest.parent().unwrap().is_dir());
        assert_eq!(artifact.destination(), dest.as_path());
    }

    #[tokio::test]
    async fn open_at_appends_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data.csv");
        let artifact = TemporaryArtifact::acquire(&dest).unwrap();
        assert_eq!(artifact.len().await.unwrap(), 0);

        tokio::fs::write(artifact.path(), b"hello").await.unwrap();
        assert_eq!(artifact.len().await.unwrap(), 5);

        {
            use tokio::io::AsyncWriteExt;
            let mut file = artifact.open_at(5).await.unwrap();
            file.write_all(b" world").await.unwrap();
            file.flush().await.unwrap();
        }
        let contents = tokio::fs::read(artifact.path()).await.unwrap();
        assert_eq!(contents, b"hello world");

        drop(artifact.open_at(0).await.unwrap());
        assert_eq!(artifact.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn promote_moves_partial_and_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data.csv");
        let artifact = TemporaryArtifact::acquire(&dest).unwrap();
        tokio::fs::write(artifact.path(), b"abc").await.unwrap();

        let promoted = artifact.promote().await.unwrap();
        assert_eq!(promoted, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"abc");
        assert!(!partial_path_for(&dest).exists());
        #[cfg(unix)]
        assert!(!lock_path_for(&dest).exists());
    }

    #[cfg(unix)]
    #[test]
    fn stale_lock_handle_is_not_current_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("live.parquet");
        let lock_path = lock_path_for(&dest);

        let first = TemporaryArtifact::acquire(&dest).unwrap();
        // A waiter that opened the lock file while `first` held it.
        let waiter = OpenOptions::new().write(true).open(&lock_path).unwrap();
        drop(first);

        // The waiter can lock the unlinked file, but it no longer guards the artifact.
        waiter.try_lock().unwrap();
        assert!(!refers_to(&waiter, &lock_path).unwrap());

        let second = TemporaryArtifact::acquire(&dest).unwrap();
        let held = second.lock.as_ref().unwrap();
        assert!(refers_to(held, &lock_path).unwrap());

        // Anyone opening the path now contends with `second`.
        assert!(matches!(
            TemporaryArtifact::acquire(&dest),
            Err(TransferError::ArtifactInUse { .. })
        ));
        assert!(matches!(lock_current(&lock_path), Err(TransferError::ArtifactInUse { .. })));
    }

    #[tokio::test]
    async fn discard_removes_partial() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data.csv");
        let artifact = TemporaryArtifact::acquire(&dest).unwrap();
        tokio::fs::write(artifact.path(), b"abc").await.unwrap();

        artifact.discard().await.unwrap();
        assert!(!partial_path_for(&dest).exists());
        assert!(!dest.exists());
    }
}
