//! Write-ahead log configuration.

use crate::error::{WalError, WalResult};
use segwal_codec::{Checksum, Crc32};
use segwal_storage::{Fsync, SyncStrategy};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default chunk size used when replaying segments.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Configuration for opening a write-ahead log.
#[derive(Clone)]
pub struct WalConfig {
    /// Directory holding the segment files.
    pub directory: PathBuf,

    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to take an advisory lock on the directory.
    pub lock_directory: bool,

    /// Checksum applied to every record.
    pub checksum: Arc<dyn Checksum>,

    /// Durability policy for segment files.
    pub sync_strategy: Arc<dyn SyncStrategy>,

    /// Chunk size for sequential segment reads.
    pub read_buffer_size: usize,
}

impl WalConfig {
    /// Creates a configuration with default values for `directory`.
    #[must_use]
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            create_if_missing: true,
            lock_directory: true,
            checksum: Arc::new(Crc32),
            sync_strategy: Arc::new(Fsync),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to lock the directory against other processes.
    #[must_use]
    pub fn lock_directory(mut self, value: bool) -> Self {
        self.lock_directory = value;
        self
    }

    /// Sets the record checksum.
    ///
    /// Segments must be reopened with the checksum they were written with.
    #[must_use]
    pub fn checksum(mut self, checksum: impl Checksum + 'static) -> Self {
        self.checksum = Arc::new(checksum);
        self
    }

    /// Sets the durability policy.
    #[must_use]
    pub fn sync_strategy(mut self, strategy: impl SyncStrategy + 'static) -> Self {
        self.sync_strategy = Arc::new(strategy);
        self
    }

    /// Sets the chunk size for sequential segment reads.
    #[must_use]
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub(crate) fn validate(&self) -> WalResult<()> {
        if self.read_buffer_size == 0 {
            return Err(WalError::invalid_config("read_buffer_size must be positive"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for WalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalConfig")
            .field("directory", &self.directory)
            .field("create_if_missing", &self.create_if_missing)
            .field("lock_directory", &self.lock_directory)
            .field("sync_strategy", &self.sync_strategy.name())
            .field("read_buffer_size", &self.read_buffer_size)
            .finish_non_exhaustive()
    }
}
