//! # segwal Core
//!
//! A durable, segmented, key-indexed write-ahead log.
//!
//! Entries are tagged with one or more [`Key`]s and appended to numbered
//! segment files. An in-memory index, rebuilt by replay on open, maps each
//! key to the records written under it, so the entries of one key can be
//! read back in write order. Old segments are retired whole with
//! [`WriteAheadLog::shift`].
//!
//! ## Layout
//!
//! ```text
//! <dir>/LOCK   advisory process lock
//! <dir>/0      segment files, named by decimal id
//! <dir>/1
//! ```
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo() -> segwal_core::WalResult<()> {
//! use futures::TryStreamExt;
//! use segwal_core::{Entry, Key, WalConfig, WriteAheadLog};
//!
//! let wal = WriteAheadLog::open(WalConfig::new("data/wal")).await?;
//!
//! wal.write(
//!     vec![
//!         Entry::new([0, 1], "a"),
//!         Entry::new([0], "b"),
//!         Entry::new([1], "c"),
//!     ],
//!     true,
//! )
//! .await?;
//!
//! let under_one: Vec<_> = wal.get(&Key::from(1)).try_collect().await?;
//! assert_eq!(under_one, vec!["a", "c"]);
//!
//! // Start a new segment, then drop the old one.
//! wal.rotate().await?;
//! wal.shift().await?;
//!
//! wal.close().await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod entry;
mod error;
mod index;
mod segment;
mod wal;

pub use config::{WalConfig, DEFAULT_READ_BUFFER_SIZE};
pub use dir::LogDir;
pub use entry::{Entry, HeadEntry};
pub use error::{ErrorCode, WalError, WalResult};
pub use wal::WriteAheadLog;

// Re-export the types callers need to build entries and configure the log.
pub use bytes::Bytes;
pub use segwal_codec::{Checksum, Crc32, Key, NoChecksum};
pub use segwal_storage::{Datasync, Fsync, NoSync, OSync, SyncStrategy};
