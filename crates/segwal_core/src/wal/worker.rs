//! The single writer.
//!
//! Every mutation of the log runs here, one command at a time, in the
//! order the commands were enqueued. The worker owns the active segment's
//! append handle; nothing else writes to segment files.

use super::Shared;
use crate::error::{WalError, WalResult};
use crate::index::BlockRef;
use crate::segment::Segment;
use bytes::Bytes;
use segwal_storage::{AppendFile, StorageResult, SyncStrategy};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// An encoded entry waiting to be appended.
#[derive(Debug)]
pub(crate) struct PendingEntry {
    /// The framed record.
    pub record: Bytes,
    /// The index entry to stamp once the record is on disk.
    pub block: Arc<BlockRef>,
}

/// Work for the writer.
#[derive(Debug)]
pub(crate) enum Command {
    /// Append records to the segment they were indexed under.
    Write {
        segment: Option<Arc<Segment>>,
        entries: Vec<PendingEntry>,
        sync: bool,
        reply: oneshot::Sender<WalResult<()>>,
    },
    /// Seal the active segment and start appending to `segment`.
    Rotate {
        segment: Arc<Segment>,
        reply: oneshot::Sender<WalResult<()>>,
    },
    /// Retire the oldest segment.
    Shift { reply: oneshot::Sender<WalResult<bool>> },
    /// Sync and close the active segment, then stop.
    Close { reply: oneshot::Sender<WalResult<()>> },
}

#[derive(Debug)]
struct ActiveSegment {
    segment: Arc<Segment>,
    file: AppendFile,
}

impl ActiveSegment {
    fn is(&self, segment: &Arc<Segment>) -> bool {
        Arc::ptr_eq(&self.segment, segment)
    }

    async fn seal(self, strategy: &dyn SyncStrategy) -> StorageResult<()> {
        self.file.sync(strategy).await?;
        self.file.close().await
    }
}

pub(crate) struct Worker {
    shared: Arc<Shared>,
    strategy: Arc<dyn SyncStrategy>,
    active: Option<ActiveSegment>,
    position: u64,
}

impl Worker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        strategy: Arc<dyn SyncStrategy>,
        active: Arc<Segment>,
        file: AppendFile,
        position: u64,
    ) -> Self {
        Self {
            shared,
            strategy,
            active: Some(ActiveSegment {
                segment: active,
                file,
            }),
            position,
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Write {
                    segment,
                    entries,
                    sync,
                    reply,
                } => {
                    let _ = reply.send(self.write(segment, entries, sync).await);
                }
                Command::Rotate { segment, reply } => {
                    let _ = reply.send(self.rotate(segment).await);
                }
                Command::Shift { reply } => {
                    let _ = reply.send(self.shift().await);
                }
                Command::Close { reply } => {
                    let _ = reply.send(self.close().await);
                    return;
                }
            }
        }
        debug!("Log writer stopped without close");
    }

    async fn write(
        &mut self,
        segment: Option<Arc<Segment>>,
        entries: Vec<PendingEntry>,
        sync: bool,
    ) -> WalResult<()> {
        let active = match (self.active.as_mut(), &segment) {
            (Some(active), Some(segment)) if active.is(segment) => active,
            _ => {
                for entry in &entries {
                    entry.block.discard();
                }
                return Err(WalError::NoLogs);
            }
        };

        if !entries.is_empty() {
            let records: Vec<Bytes> = entries.iter().map(|e| e.record.clone()).collect();
            if let Err(err) = active.file.append_vectored(&records).await {
                for entry in &entries {
                    entry.block.discard();
                }
                // Cut off whatever prefix made it out so the next append
                // starts on a record boundary.
                if let Err(truncate_err) =
                    segwal_storage::truncate(active.file.path(), self.position).await
                {
                    warn!(
                        segment = active.segment.id(),
                        position = self.position,
                        error = %truncate_err,
                        "Failed to drop partial append"
                    );
                    if let Ok(len) = active.file.len().await {
                        self.position = len;
                        self.shared.position.store(len, Ordering::Release);
                    }
                }
                return Err(err.into());
            }

            let start = self.position;
            for entry in &entries {
                // Record length was checked to fit when the entry was encoded.
                let length = entry.record.len() as u32;
                entry.block.persist(self.position, length);
                self.position += u64::from(length);
            }
            self.shared.position.store(self.position, Ordering::Release);

            debug!(
                segment = active.segment.id(),
                records = entries.len(),
                bytes = self.position - start,
                position = self.position,
                "Appended batch"
            );
        }

        if sync {
            active.file.sync(self.strategy.as_ref()).await?;
        }
        Ok(())
    }

    async fn open_segment(&self, segment: &Segment) -> WalResult<AppendFile> {
        self.shared.dir.create_segment(segment.id()).await?;
        Ok(AppendFile::open(segment.path(), self.strategy.as_ref()).await?)
    }

    /// Creates the new segment, makes it active, then seals the old one.
    ///
    /// The segment joins the list only once its file exists.
    async fn rotate(&mut self, segment: Arc<Segment>) -> WalResult<()> {
        let opened = self.open_segment(&segment).await;
        {
            let mut queue = self.shared.queue.lock();
            queue.pending.retain(|s| !Arc::ptr_eq(s, &segment));
            if opened.is_ok() {
                self.shared.segments.write().push(Arc::clone(&segment));
            }
        }
        let file = opened?;

        let previous = self.active.replace(ActiveSegment {
            segment: Arc::clone(&segment),
            file,
        });
        self.position = 0;
        self.shared.position.store(0, Ordering::Release);

        let previous_id = previous.as_ref().map(|active| active.segment.id());
        if let Some(previous) = previous {
            previous.seal(self.strategy.as_ref()).await?;
        }

        info!(previous = ?previous_id, segment = segment.id(), "Rotated log segment");
        Ok(())
    }

    async fn shift(&mut self) -> WalResult<bool> {
        let Some(segment) = self.shared.oldest_segment() else {
            return Ok(false);
        };

        let exclusive = segment.lock.exclude().await;
        self.shared
            .segments
            .write()
            .retain(|s| !Arc::ptr_eq(s, &segment));
        segment.mark_shifted();
        drop(exclusive);

        if self.active.as_ref().is_some_and(|active| active.is(&segment)) {
            if let Some(active) = self.active.take() {
                active.file.close().await?;
            }
            self.position = 0;
            self.shared.position.store(0, Ordering::Release);
        }

        self.shared.dir.remove_segment(segment.id()).await?;

        info!(
            segment = segment.id(),
            remaining = self.shared.segments.read().len(),
            "Retired log segment"
        );
        Ok(true)
    }

    async fn close(&mut self) -> WalResult<()> {
        let sealed = match self.active.take() {
            Some(active) => active.seal(self.strategy.as_ref()).await,
            None => Ok(()),
        };
        // Released even when the final sync fails.
        self.shared.dir.unlock();
        info!(
            directory = %self.shared.dir.path().display(),
            position = self.position,
            sealed = sealed.is_ok(),
            "Closed write-ahead log"
        );
        Ok(sealed?)
    }
}
