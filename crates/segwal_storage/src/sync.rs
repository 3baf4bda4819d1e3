//! Durability policies for segment files.
//!
//! A [`SyncStrategy`] decides two things: the mode a segment file is opened
//! with, and what must be done after appending to guarantee the bytes
//! survive a crash.
//!
//! | strategy     | open mode        | `sync`       |
//! |--------------|------------------|--------------|
//! | [`Fsync`]    | append           | `sync_all`   |
//! | [`Datasync`] | append           | `sync_data`  |
//! | [`OSync`]    | append + `O_SYNC`| nothing      |
//! | [`NoSync`]   | append           | nothing      |

use async_trait::async_trait;
use std::io;
use tokio::fs::{File, OpenOptions};

/// A pluggable durability policy for segment files.
#[async_trait]
pub trait SyncStrategy: Send + Sync + std::fmt::Debug {
    /// Short name used in logs and benchmarks.
    fn name(&self) -> &'static str;

    /// Options used to open a segment for appending.
    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.append(true).create(true);
        options
    }

    /// Makes every byte appended to `file` so far durable.
    async fn sync(&self, file: &File) -> io::Result<()>;
}

/// Flush data and metadata with `fsync`. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fsync;

#[async_trait]
impl SyncStrategy for Fsync {
    fn name(&self) -> &'static str {
        "fsync"
    }

    async fn sync(&self, file: &File) -> io::Result<()> {
        file.sync_all().await
    }
}

/// Flush data with `fdatasync`, skipping metadata not needed to read it back.
#[derive(Debug, Clone, Copy, Default)]
pub struct Datasync;

#[async_trait]
impl SyncStrategy for Datasync {
    fn name(&self) -> &'static str {
        "datasync"
    }

    async fn sync(&self, file: &File) -> io::Result<()> {
        file.sync_data().await
    }
}

/// Open segments with `O_SYNC` so every write is durable when it returns.
///
/// On platforms without `O_SYNC` this falls back to `sync_all`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OSync;

#[async_trait]
impl SyncStrategy for OSync {
    fn name(&self) -> &'static str {
        "o_sync"
    }

    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        options.custom_flags(libc::O_SYNC);
        options
    }

    #[cfg(unix)]
    async fn sync(&self, _file: &File) -> io::Result<()> {
        Ok(())
    }

    #[cfg(not(unix))]
    async fn sync(&self, file: &File) -> io::Result<()> {
        file.sync_all().await
    }
}

/// Never sync. Appended bytes reach the OS page cache only.
///
/// Intended for tests and benchmarks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSync;

#[async_trait]
impl SyncStrategy for NoSync {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn sync(&self, _file: &File) -> io::Result<()> {
        Ok(())
    }
}
