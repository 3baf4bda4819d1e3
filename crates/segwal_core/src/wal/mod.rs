//! The write-ahead log engine.
//!
//! ## Design
//!
//! - One background task, the writer, applies every write, rotate, and
//!   shift in submission order. It exclusively owns the active segment's
//!   append handle.
//! - Entries are indexed in memory before they are queued, so a write is
//!   visible to readers as soon as [`WriteAheadLog::write`] returns.
//! - Only the writer changes the segment list. The queue tracks where
//!   writes are routed in submission order: the segment a queued rotation
//!   will create is known, and readable, before the writer gets to it.
//! - Readers consult the index and the segment files directly, never the
//!   queue, and coordinate with retirement through per-segment locks.
//!
//! ## Durability
//!
//! A record is durable once a write submitted with `sync = true` (or a
//! [`flush`](WriteAheadLog::flush)) completes, or once its segment has
//! been rotated away or the log closed.

mod reader;
mod worker;

use crate::config::WalConfig;
use crate::dir::LogDir;
use crate::entry::{Entry, HeadEntry};
use crate::error::{WalError, WalResult};
use crate::index::{canonical_keys, BlockRef};
use crate::segment::{recovery, Segment};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use reader::{GetCursor, HeadCursor};
use segwal_codec::{encode_keys, CodecError, FrameDecoder, FrameEncoder, Key};
use segwal_storage::AppendFile;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;
use worker::{Command, PendingEntry, Worker};

/// The submission side of the writer queue.
///
/// `target` and `live` describe the segment list as it will be once every
/// queued command has run.
struct Queue {
    /// `None` once the log is closed.
    sender: Option<mpsc::UnboundedSender<Command>>,
    /// Segment that newly submitted writes go to.
    target: Option<Arc<Segment>>,
    /// Segments left after the queued rotations and shifts.
    live: usize,
    /// Segments of queued rotations the writer has not applied yet.
    pending: Vec<Arc<Segment>>,
}

impl Queue {
    /// Id of the segment the next rotation creates.
    fn next_id(&self) -> u64 {
        match &self.target {
            Some(last) if self.live > 0 => last.id() + 1,
            _ => 0,
        }
    }
}

/// State shared between the handle, the writer, and the read cursors.
///
/// Lock order: `queue`, then `segments`.
pub(crate) struct Shared {
    dir: LogDir,
    /// Applied segments, oldest first. Changed by the writer only.
    segments: RwLock<Vec<Arc<Segment>>>,
    queue: Mutex<Queue>,
    position: AtomicU64,
    decoder: FrameDecoder,
    read_buffer_size: usize,
}

impl Shared {
    fn segments_snapshot(&self) -> Vec<Arc<Segment>> {
        self.segments.read().clone()
    }

    /// Applied segments followed by those of queued rotations.
    fn readable_segments(&self) -> Vec<Arc<Segment>> {
        let queue = self.queue.lock();
        let mut segments = self.segments.read().clone();
        segments.extend(queue.pending.iter().cloned());
        segments
    }

    fn oldest_segment(&self) -> Option<Arc<Segment>> {
        self.segments.read().first().cloned()
    }

    fn ensure_open(&self) -> WalResult<()> {
        if self.queue.lock().sender.is_none() {
            return Err(WalError::Closed);
        }
        Ok(())
    }

    /// Builds and sends one command while holding the queue lock.
    ///
    /// Anything `build` does to the index or the routing state is
    /// therefore ordered exactly like the command itself.
    fn enqueue(&self, build: impl FnOnce(&mut Queue) -> Command) -> WalResult<()> {
        let mut queue = self.queue.lock();
        if queue.sender.is_none() {
            return Err(WalError::Closed);
        }
        let command = build(&mut queue);
        match &queue.sender {
            Some(sender) => sender.send(command).map_err(|_| WalError::Closed),
            None => Err(WalError::Closed),
        }
    }
}

/// A durable, segmented, key-indexed write-ahead log.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> segwal_core::WalResult<()> {
/// use futures::TryStreamExt;
/// use segwal_core::{Entry, Key, WriteAheadLog};
///
/// let wal = WriteAheadLog::open_dir("data/wal").await?;
///
/// wal.write(vec![Entry::new([0, 1], "a"), Entry::new([1], "c")], true)
///     .await?;
///
/// let bodies: Vec<_> = wal.get(&Key::from(1)).try_collect().await?;
/// assert_eq!(bodies, vec!["a", "c"]);
///
/// wal.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct WriteAheadLog {
    shared: Arc<Shared>,
    encoder: FrameEncoder,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WriteAheadLog {
    /// Opens the log in `directory` with default settings.
    pub async fn open_dir(directory: impl AsRef<Path>) -> WalResult<Self> {
        Self::open(WalConfig::new(directory)).await
    }

    /// Opens a log, replaying every segment to rebuild the index.
    ///
    /// An empty directory gets segment `0`. The highest-numbered segment
    /// becomes the active one.
    ///
    /// # Errors
    ///
    /// Any failure to list, open, read, or decode a segment aborts the
    /// open; no partially recovered log is returned.
    pub async fn open(config: WalConfig) -> WalResult<Self> {
        config.validate()?;
        let dir = LogDir::open(
            &config.directory,
            config.create_if_missing,
            config.lock_directory,
        )
        .await?;

        let mut ids = dir.segment_ids().await?;
        if ids.is_empty() {
            dir.create_segment(0).await?;
            ids.push(0);
        }

        let decoder = FrameDecoder::new(Arc::clone(&config.checksum));
        let mut segments = Vec::with_capacity(ids.len());
        let mut records = 0usize;
        let mut position = 0u64;
        let last = ids.len() - 1;
        for (i, &id) in ids.iter().enumerate() {
            let segment = Segment::new(id, dir.segment_path(id));
            let stats = recovery::replay(
                id,
                segment.path(),
                decoder.clone(),
                config.read_buffer_size,
                segment.index(),
                i == last,
            )
            .await?;
            records += stats.records;
            position = stats.length;
            segments.push(segment);
        }

        let active = Arc::clone(&segments[last]);
        let active_id = active.id();
        let file = AppendFile::open(active.path(), config.sync_strategy.as_ref()).await?;

        info!(
            directory = %dir.path().display(),
            segments = ids.len(),
            records,
            active = active_id,
            position,
            sync = config.sync_strategy.name(),
            "Opened write-ahead log"
        );

        let (sender, receiver) = mpsc::unbounded_channel();
        let live = segments.len();
        let shared = Arc::new(Shared {
            dir,
            segments: RwLock::new(segments),
            queue: Mutex::new(Queue {
                sender: Some(sender),
                target: Some(Arc::clone(&active)),
                live,
                pending: Vec::new(),
            }),
            position: AtomicU64::new(position),
            decoder,
            read_buffer_size: config.read_buffer_size,
        });

        let worker = Worker::new(
            Arc::clone(&shared),
            Arc::clone(&config.sync_strategy),
            active,
            file,
            position,
        );
        let handle = tokio::spawn(worker.run(receiver));

        Ok(Self {
            shared,
            encoder: FrameEncoder::new(config.checksum),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Writes a batch of entries to the active segment.
    ///
    /// The entries are readable through [`get`](Self::get) as soon as this
    /// method returns; the returned future completes once they are
    /// appended, and once they are durable if `sync` is set.
    ///
    /// # Errors
    ///
    /// - [`WalError::NoLogs`] if every segment has been retired
    /// - [`WalError::InvalidEntry`] if an entry cannot be encoded
    /// - [`WalError::Closed`] after [`close`](Self::close)
    /// - an I/O error if appending or syncing fails
    pub fn write(
        &self,
        entries: Vec<Entry>,
        sync: bool,
    ) -> impl Future<Output = WalResult<()>> + Send + 'static {
        let submitted = self.submit_write(entries, sync);
        async move { submitted?.await.map_err(|_| WalError::Closed)? }
    }

    fn submit_write(
        &self,
        entries: Vec<Entry>,
        sync: bool,
    ) -> WalResult<oneshot::Receiver<WalResult<()>>> {
        let mut encoded = Vec::with_capacity(entries.len());
        for entry in entries {
            let keys =
                encode_keys(&entry.keys).map_err(|source| WalError::InvalidEntry { source })?;
            let record = self
                .encoder
                .encode(&[Bytes::from(keys), entry.body.clone()])
                .map_err(|source| WalError::InvalidEntry { source })?;
            if u32::try_from(record.len()).is_err() {
                return Err(WalError::InvalidEntry {
                    source: CodecError::encoding_failed("record longer than u32::MAX bytes"),
                });
            }
            encoded.push((canonical_keys(&entry.keys), entry.body, record));
        }

        let (reply, receiver) = oneshot::channel();
        self.shared.enqueue(|queue| {
            let segment = queue.target.clone();
            let entries = encoded
                .into_iter()
                .map(|(keys, body, record)| {
                    let block = BlockRef::buffered(body);
                    if let Some(segment) = &segment {
                        segment.index().insert(&keys, &block);
                    }
                    PendingEntry { record, block }
                })
                .collect();
            Command::Write {
                segment,
                entries,
                sync,
                reply,
            }
        })?;
        Ok(receiver)
    }

    /// Completes once everything submitted before it is durable.
    pub fn flush(&self) -> impl Future<Output = WalResult<()>> + Send + 'static {
        self.write(Vec::new(), true)
    }

    /// Streams the bodies written under `key`, oldest first.
    ///
    /// Segments are visited in id order and records in append order within
    /// each. Retired segments are skipped. Dropping the stream releases
    /// every segment it holds.
    ///
    /// # Errors
    ///
    /// The stream yields one error and ends if a block cannot be read or
    /// fails validation.
    pub fn get(&self, key: &Key) -> BoxStream<'static, WalResult<Bytes>> {
        let cursor = GetCursor::new(Arc::clone(&self.shared), key.canonical());
        stream::try_unfold(cursor, |mut cursor| async move {
            Ok::<_, WalError>(cursor.next().await?.map(|body| (body, cursor)))
        })
        .boxed()
    }

    /// Alias of [`get`](Self::get).
    pub fn read(&self, key: &Key) -> BoxStream<'static, WalResult<Bytes>> {
        self.get(key)
    }

    /// Streams every record of the oldest segment.
    ///
    /// Yields nothing unless more than one segment exists, so the active
    /// segment is never scanned. Useful for inspecting what the next
    /// [`shift`](Self::shift) will retire.
    pub fn head(&self) -> BoxStream<'static, WalResult<HeadEntry>> {
        let cursor = HeadCursor::new(Arc::clone(&self.shared));
        stream::try_unfold(cursor, |mut cursor| async move {
            Ok::<_, WalError>(cursor.next().await?.map(|entry| (entry, cursor)))
        })
        .boxed()
    }

    /// Starts a new segment.
    ///
    /// The new segment's id is one past the last segment's, or `0` when
    /// every segment has been retired. Writes submitted before the rotation
    /// land in the old segment, writes submitted after it in the new one.
    /// The old segment is synced and closed.
    pub fn rotate(&self) -> impl Future<Output = WalResult<()>> + Send + 'static {
        let (reply, receiver) = oneshot::channel();
        let submitted = self.shared.enqueue(|queue| {
            let id = queue.next_id();
            let segment = Segment::new(id, self.shared.dir.segment_path(id));
            queue.target = Some(Arc::clone(&segment));
            queue.live += 1;
            queue.pending.push(Arc::clone(&segment));
            Command::Rotate { segment, reply }
        });
        async move {
            submitted?;
            receiver.await.map_err(|_| WalError::Closed)?
        }
    }

    /// Retires the oldest segment and deletes its file.
    ///
    /// Waits for readers of that segment to finish. Returns `false`, and
    /// does nothing, if no segments remain.
    pub fn shift(&self) -> impl Future<Output = WalResult<bool>> + Send + 'static {
        let (reply, receiver) = oneshot::channel();
        let submitted = self.shared.enqueue(|queue| {
            queue.live = queue.live.saturating_sub(1);
            if queue.live == 0 {
                queue.target = None;
            }
            Command::Shift { reply }
        });
        async move {
            submitted?;
            receiver.await.map_err(|_| WalError::Closed)?
        }
    }

    /// Drains the queue, syncs and closes the active segment, and stops
    /// the writer.
    ///
    /// Every later operation fails with [`WalError::Closed`].
    pub async fn close(&self) -> WalResult<()> {
        let sender = self
            .shared
            .queue
            .lock()
            .sender
            .take()
            .ok_or(WalError::Closed)?;

        let (reply, receiver) = oneshot::channel();
        let sent = sender.send(Command::Close { reply });
        drop(sender);
        let result = match sent {
            Ok(()) => receiver.await.map_err(|_| WalError::Closed)?,
            Err(_) => Err(WalError::Closed),
        };

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            // The writer only fails to join if it panicked.
            if handle.await.is_err() {
                return Err(WalError::Closed);
            }
        }
        result
    }

    /// Write position in the active segment.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.shared.position.load(Ordering::Acquire)
    }

    /// Ids of the segments not yet retired, oldest first.
    ///
    /// Reflects the rotations and shifts the writer has applied so far.
    #[must_use]
    pub fn segment_ids(&self) -> Vec<u64> {
        self.shared.segments.read().iter().map(|s| s.id()).collect()
    }

    /// The log directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        self.shared.dir.path()
    }
}

impl Drop for WriteAheadLog {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain the queue and exit.
        self.shared.queue.lock().sender.take();
    }
}

impl std::fmt::Debug for WriteAheadLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteAheadLog")
            .field("directory", &self.shared.dir.path())
            .field("segments", &self.segment_ids())
            .field("position", &self.position())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use segwal_storage::NoSync;
    use tempfile::tempdir;

    async fn open(path: &Path) -> WriteAheadLog {
        WriteAheadLog::open(WalConfig::new(path).sync_strategy(NoSync))
            .await
            .unwrap()
    }

    async fn bodies(wal: &WriteAheadLog, key: i64) -> Vec<Bytes> {
        wal.get(&Key::from(key)).try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn empty_directory_starts_at_segment_zero() {
        let temp = tempdir().unwrap();
        let wal = open(temp.path()).await;

        assert_eq!(wal.segment_ids(), vec![0]);
        assert_eq!(wal.position(), 0);
        assert!(temp.path().join("0").exists());
        wal.close().await.unwrap();
    }

    #[tokio::test]
    async fn writes_are_visible_before_completion() {
        let temp = tempdir().unwrap();
        let wal = open(temp.path()).await;

        let pending = wal.write(vec![Entry::new([7], "buffered")], false);
        assert_eq!(bodies(&wal, 7).await, vec!["buffered"]);

        pending.await.unwrap();
        assert_eq!(bodies(&wal, 7).await, vec!["buffered"]);
        assert!(wal.position() > 0);
        wal.close().await.unwrap();
    }

    #[tokio::test]
    async fn position_tracks_appended_bytes() {
        let temp = tempdir().unwrap();
        let wal = open(temp.path()).await;

        wal.write(vec![Entry::new([1], "x"), Entry::new([2], "y")], true)
            .await
            .unwrap();
        let on_disk = tokio::fs::metadata(temp.path().join("0"))
            .await
            .unwrap()
            .len();
        assert_eq!(wal.position(), on_disk);
        wal.close().await.unwrap();
    }

    #[tokio::test]
    async fn writes_behind_a_queued_rotation_are_visible() {
        let temp = tempdir().unwrap();
        let wal = open(temp.path()).await;

        let rotated = wal.rotate();
        let written = wal.write(vec![Entry::new([7], "next")], false);
        assert_eq!(bodies(&wal, 7).await, vec!["next"]);

        rotated.await.unwrap();
        written.await.unwrap();
        assert_eq!(wal.segment_ids(), vec![0, 1]);
        assert!(wal.position() > 0);
        assert!(temp.path().join("1").exists());
        assert_eq!(bodies(&wal, 7).await, vec!["next"]);
        wal.close().await.unwrap();
    }

    #[tokio::test]
    async fn shift_queued_before_rotate_ignores_the_new_segment() {
        let temp = tempdir().unwrap();
        let wal = open(temp.path()).await;
        assert!(wal.shift().await.unwrap());
        assert!(wal.segment_ids().is_empty());

        let shifted = wal.shift();
        let rotated = wal.rotate();
        assert!(!shifted.await.unwrap());
        rotated.await.unwrap();

        assert_eq!(wal.segment_ids(), vec![0]);
        wal.write(vec![Entry::new([1], "x")], true).await.unwrap();
        assert_eq!(bodies(&wal, 1).await, vec!["x"]);
        wal.close().await.unwrap();
    }

    #[tokio::test]
    async fn queued_shifts_and_rotations_number_from_the_survivors() {
        let temp = tempdir().unwrap();
        let wal = open(temp.path()).await;

        // [0] -> [0, 1] -> [1] -> [] -> [0]
        let first = wal.rotate();
        let shift_zero = wal.shift();
        let shift_one = wal.shift();
        let second = wal.rotate();
        let written = wal.write(vec![Entry::new([3], "fresh")], false);

        first.await.unwrap();
        assert!(shift_zero.await.unwrap());
        assert!(shift_one.await.unwrap());
        second.await.unwrap();
        written.await.unwrap();

        assert_eq!(wal.segment_ids(), vec![0]);
        assert_eq!(bodies(&wal, 3).await, vec!["fresh"]);
        wal.close().await.unwrap();
    }

    #[tokio::test]
    async fn flush_with_no_logs_fails() {
        let temp = tempdir().unwrap();
        let wal = open(temp.path()).await;

        assert!(wal.shift().await.unwrap());
        let err = wal.flush().await.unwrap_err();
        assert!(matches!(err, WalError::NoLogs));
        wal.close().await.unwrap();
    }

    #[tokio::test]
    async fn operations_fail_after_close() {
        let temp = tempdir().unwrap();
        let wal = open(temp.path()).await;
        wal.close().await.unwrap();

        assert!(matches!(
            wal.write(vec![Entry::new([1], "x")], false).await,
            Err(WalError::Closed)
        ));
        assert!(matches!(wal.rotate().await, Err(WalError::Closed)));
        assert!(matches!(wal.shift().await, Err(WalError::Closed)));
        assert!(matches!(wal.close().await, Err(WalError::Closed)));

        let read: WalResult<Vec<Bytes>> = wal.get(&Key::from(1)).try_collect().await;
        assert!(matches!(read, Err(WalError::Closed)));
        let head: WalResult<Vec<HeadEntry>> = wal.head().try_collect().await;
        assert!(matches!(head, Err(WalError::Closed)));
    }

    #[tokio::test]
    async fn close_releases_directory_lock() {
        let temp = tempdir().unwrap();
        let first = open(temp.path()).await;

        assert!(matches!(
            WriteAheadLog::open_dir(temp.path()).await,
            Err(WalError::Locked { .. })
        ));

        first.close().await.unwrap();
        let second = open(temp.path()).await;
        second.close().await.unwrap();
    }

    #[tokio::test]
    async fn oversized_entries_are_rejected_before_indexing() {
        let temp = tempdir().unwrap();
        let wal = open(temp.path()).await;

        let keys: Vec<Key> = Vec::new();
        let entry = Entry {
            keys,
            body: Bytes::from(vec![0u8; segwal_codec::MAX_PART_LENGTH + 1]),
        };
        let err = wal.write(vec![entry], false).await.unwrap_err();
        assert!(matches!(err, WalError::InvalidEntry { .. }));
        assert_eq!(err.code(), crate::ErrorCode::InvalidArgument);
        wal.close().await.unwrap();
    }
}
