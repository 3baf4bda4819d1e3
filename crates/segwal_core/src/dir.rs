//! Log directory management.
//!
//! One directory holds one log:
//!
//! ```text
//! <log_dir>/
//! ├─ LOCK   # Advisory lock for single-process access (optional)
//! ├─ 0      # Segment files, named by decimal id
//! ├─ 1
//! └─ ...
//! ```
//!
//! Only purely numeric names are segments. Everything else in the
//! directory, including `LOCK`, is ignored.

use crate::error::{WalError, WalResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";

/// The directory of one write-ahead log.
#[derive(Debug)]
pub struct LogDir {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    lock_file: Mutex<Option<File>>,
}

impl LogDir {
    /// Opens a log directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - `lock` is set and another process holds the lock
    /// - I/O errors occur
    pub async fn open(path: &Path, create_if_missing: bool, lock: bool) -> WalResult<Self> {
        if create_if_missing {
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| WalError::io(path, e))?;
        }

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| WalError::io(path, e))?;
        if !metadata.is_dir() {
            return Err(WalError::invalid_config(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = if lock {
            let dir = path.to_path_buf();
            let locked = tokio::task::spawn_blocking(move || lock_directory(&dir))
                .await
                .map_err(|e| WalError::io(path, io::Error::other(e)))??;
            Some(locked)
        } else {
            None
        };

        Ok(Self {
            path: path.to_path_buf(),
            lock_file: Mutex::new(lock_file),
        })
    }

    /// Releases the directory lock, if held.
    ///
    /// Called on close so the directory can be reopened while handles to
    /// the closed log are still alive.
    pub fn unlock(&self) {
        self.lock_file.lock().take();
    }

    /// Returns the path to the log directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of segment `id`.
    #[must_use]
    pub fn segment_path(&self, id: u64) -> PathBuf {
        self.path.join(id.to_string())
    }

    /// Lists segment ids in ascending numeric order.
    pub async fn segment_ids(&self) -> WalResult<Vec<u64>> {
        let mut entries = tokio::fs::read_dir(&self.path)
            .await
            .map_err(|e| WalError::io(&self.path, e))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WalError::io(&self.path, e))?
        {
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(parse_segment_name) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Creates an empty segment file for `id`, failing if it exists.
    pub async fn create_segment(&self, id: u64) -> WalResult<PathBuf> {
        let path = self.segment_path(id);
        segwal_storage::create_new(&path).await?;
        self.sync().await?;
        Ok(path)
    }

    /// Removes the segment file for `id`.
    pub async fn remove_segment(&self, id: u64) -> WalResult<()> {
        segwal_storage::remove(&self.segment_path(id)).await?;
        self.sync().await
    }

    /// Syncs the directory so created and removed segments are durable.
    pub async fn sync(&self) -> WalResult<()> {
        segwal_storage::sync_directory(&self.path).await?;
        Ok(())
    }
}

/// Takes the exclusive advisory lock on `<dir>/LOCK`.
fn lock_directory(dir: &Path) -> WalResult<File> {
    let lock_path = dir.join(LOCK_FILE);
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| WalError::Open {
            filename: lock_path.clone(),
            source: e,
        })?;

    // Non-blocking: a second process fails fast instead of waiting.
    if lock_file.try_lock_exclusive().is_err() {
        return Err(WalError::Locked {
            path: dir.to_path_buf(),
        });
    }
    Ok(lock_file)
}

/// Parses a segment file name: ASCII digits only.
fn parse_segment_name(name: &str) -> Option<u64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}
