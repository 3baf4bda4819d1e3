//! Async segment file handles.

use crate::error::{StorageError, StorageResult};
use crate::sync::SyncStrategy;
use bytes::{Bytes, BytesMut};
use std::io::{self, IoSlice, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// The append-only handle of the active segment.
///
/// Only one `AppendFile` should exist per segment; the log writer owns it
/// exclusively. Bytes are visible to other handles once
/// [`append_vectored`](Self::append_vectored) returns, and durable once
/// [`sync`](Self::sync) returns.
#[derive(Debug)]
pub struct AppendFile {
    path: PathBuf,
    file: File,
}

impl AppendFile {
    /// Opens `path` for appending using the strategy's open mode.
    ///
    /// The file is created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened.
    pub async fn open(path: &Path, strategy: &dyn SyncStrategy) -> StorageResult<Self> {
        let file = strategy
            .open_options()
            .open(path)
            .await
            .map_err(|e| StorageError::open(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current length of the file.
    pub async fn len(&self) -> StorageResult<u64> {
        let metadata = self
            .file
            .metadata()
            .await
            .map_err(|e| StorageError::read(&self.path, e))?;
        Ok(metadata.len())
    }

    /// Appends every buffer, in order, as one contiguous run of bytes.
    ///
    /// Returns the number of bytes appended. Partial vectored writes are
    /// resumed until every buffer has been written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the write fails. The file may then
    /// hold a prefix of the buffers.
    pub async fn append_vectored(&mut self, buffers: &[Bytes]) -> StorageResult<u64> {
        let total: usize = buffers.iter().map(Bytes::len).sum();
        if total == 0 {
            return Ok(0);
        }

        let mut slices: Vec<IoSlice<'_>> = buffers.iter().map(|b| IoSlice::new(b)).collect();
        let mut remaining = &mut slices[..];
        while !remaining.is_empty() {
            let written = self
                .file
                .write_vectored(remaining)
                .await
                .map_err(|e| StorageError::write(&self.path, e))?;
            if written == 0 {
                return Err(StorageError::write(
                    &self.path,
                    io::Error::new(io::ErrorKind::WriteZero, "segment accepted no bytes"),
                ));
            }
            IoSlice::advance_slices(&mut remaining, written);
        }

        // tokio completes file writes in the background; wait for them so
        // other handles can read the bytes.
        self.file
            .flush()
            .await
            .map_err(|e| StorageError::write(&self.path, e))?;

        Ok(total as u64)
    }

    /// Makes all appended bytes durable according to `strategy`.
    pub async fn sync(&self, strategy: &dyn SyncStrategy) -> StorageResult<()> {
        strategy
            .sync(&self.file)
            .await
            .map_err(|e| StorageError::write(&self.path, e))
    }

    /// Flushes outstanding writes and closes the handle.
    pub async fn close(mut self) -> StorageResult<()> {
        self.file
            .flush()
            .await
            .map_err(|e| StorageError::write(&self.path, e))?;
        drop(self.file);
        Ok(())
    }
}

/// A read-only handle for positional reads.
#[derive(Debug)]
pub struct SegmentReader {
    path: PathBuf,
    file: File,
}

impl SegmentReader {
    /// Opens `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened,
    /// including when it does not exist.
    pub async fn open(path: &Path) -> StorageResult<Self> {
        let file = File::open(path)
            .await
            .map_err(|e| StorageError::open(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads up to `len` bytes starting at `position`.
    ///
    /// Returns fewer than `len` bytes only if the end of the file is
    /// reached first; detecting the short read is left to the caller.
    pub async fn read_at(&mut self, position: u64, len: usize) -> StorageResult<Bytes> {
        self.file
            .seek(SeekFrom::Start(position))
            .await
            .map_err(|e| StorageError::read(&self.path, e))?;

        let mut buffer = vec![0u8; len];
        let mut filled = 0usize;
        while filled < len {
            let read = self
                .file
                .read(&mut buffer[filled..])
                .await
                .map_err(|e| StorageError::read(&self.path, e))?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        buffer.truncate(filled);
        Ok(Bytes::from(buffer))
    }
}

/// Reads a file front to back in fixed-size chunks.
#[derive(Debug)]
pub struct ChunkReader {
    path: PathBuf,
    file: File,
    chunk_size: usize,
}

impl ChunkReader {
    /// Opens `path` for sequential reading in chunks of `chunk_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be opened.
    pub async fn open(path: &Path, chunk_size: usize) -> StorageResult<Self> {
        let file = File::open(path)
            .await
            .map_err(|e| StorageError::open(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            chunk_size: chunk_size.max(1),
        })
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the next chunk, or `None` at end of file.
    ///
    /// Chunks may be shorter than the chunk size.
    pub async fn next_chunk(&mut self) -> StorageResult<Option<Bytes>> {
        let mut buffer = BytesMut::zeroed(self.chunk_size);
        let read = self
            .file
            .read(&mut buffer)
            .await
            .map_err(|e| StorageError::read(&self.path, e))?;
        if read == 0 {
            return Ok(None);
        }
        buffer.truncate(read);
        Ok(Some(buffer.freeze()))
    }
}

/// Creates an empty file, failing if it already exists.
pub async fn create_new(path: &Path) -> StorageResult<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| StorageError::open(path, e))?;
    Ok(())
}

/// Removes a file.
pub async fn remove(path: &Path) -> StorageResult<()> {
    tokio::fs::remove_file(path)
        .await
        .map_err(|e| StorageError::write(path, e))
}

/// Truncates a file to `len` bytes and syncs it.
pub async fn truncate(path: &Path, len: u64) -> StorageResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|e| StorageError::open(path, e))?;
    file.set_len(len)
        .await
        .map_err(|e| StorageError::write(path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::write(path, e))
}

/// Syncs a directory so that created and removed entries are durable.
///
/// Windows NTFS journals metadata operations and does not support
/// directory fsync, so this is a no-op there.
#[cfg(unix)]
pub async fn sync_directory(path: &Path) -> StorageResult<()> {
    let dir = File::open(path)
        .await
        .map_err(|e| StorageError::open(path, e))?;
    dir.sync_all()
        .await
        .map_err(|e| StorageError::write(path, e))
}

/// Syncs a directory so that created and removed entries are durable.
#[cfg(not(unix))]
pub async fn sync_directory(_path: &Path) -> StorageResult<()> {
    Ok(())
}
