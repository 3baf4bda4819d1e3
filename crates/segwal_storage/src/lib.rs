//! # segwal Storage
//!
//! Async file primitives for segwal log segments.
//!
//! Segment files are **opaque byte stores** at this layer: nothing here
//! knows about frames, keys, or indexes.
//!
//! ## Provided
//!
//! - [`SyncStrategy`] - how a segment is made durable and how it is opened
//!   ([`Fsync`], [`Datasync`], [`OSync`], [`NoSync`])
//! - [`AppendFile`] - the append-only handle owned by the log writer
//! - [`SegmentReader`] - positional reads for point lookups
//! - [`ChunkReader`] - sequential chunked reads for replay
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo() -> segwal_storage::StorageResult<()> {
//! use bytes::Bytes;
//! use segwal_storage::{AppendFile, Fsync, SegmentReader};
//! use std::path::Path;
//!
//! let strategy = Fsync;
//! let mut file = AppendFile::open(Path::new("log/0"), &strategy).await?;
//! file.append_vectored(&[Bytes::from_static(b"hello")]).await?;
//! file.sync(&strategy).await?;
//!
//! let mut reader = SegmentReader::open(Path::new("log/0")).await?;
//! let data = reader.read_at(0, 5).await?;
//! assert_eq!(&data[..], b"hello");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod sync;

pub use error::{StorageError, StorageResult};
pub use file::{create_new, remove, sync_directory, truncate, AppendFile, ChunkReader, SegmentReader};
pub use sync::{Datasync, Fsync, NoSync, OSync, SyncStrategy};
