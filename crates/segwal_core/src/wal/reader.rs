//! Read cursors.
//!
//! Readers never go through the writer queue. They coordinate with
//! retirement through the per-segment locks only: a cursor takes a shared
//! lock on every segment it will visit before doing any I/O, and drops
//! each lock when it is done with that segment or when the cursor itself
//! is dropped.

use super::Shared;
use crate::entry::HeadEntry;
use crate::error::{WalError, WalResult};
use crate::index::{BlockRef, BlockState};
use crate::segment::scan::FrameScanner;
use crate::segment::{Segment, SharedGuard};
use bytes::Bytes;
use segwal_codec::{decode_keys, CanonicalKey};
use segwal_storage::SegmentReader;
use std::collections::VecDeque;
use std::sync::Arc;

/// A segment held open for reading.
struct LockedSegment {
    segment: Arc<Segment>,
    _guard: SharedGuard,
}

/// Shared-locks every live segment, oldest first, including those of
/// rotations still in the queue.
async fn lock_segments(shared: &Shared) -> VecDeque<LockedSegment> {
    let segments = shared.readable_segments();
    let mut locked = VecDeque::with_capacity(segments.len());
    for segment in segments {
        let guard = segment.lock.share().await;
        if !segment.is_shifted() {
            locked.push_back(LockedSegment {
                segment,
                _guard: guard,
            });
        }
    }
    locked
}

/// The segment a [`GetCursor`] is currently reading.
struct Current {
    locked: LockedSegment,
    blocks: VecDeque<Arc<BlockRef>>,
    reader: Option<SegmentReader>,
}

/// Yields the bodies written under one key, oldest first.
pub(crate) struct GetCursor {
    shared: Arc<Shared>,
    key: CanonicalKey,
    pending: Option<VecDeque<LockedSegment>>,
    current: Option<Current>,
}

impl GetCursor {
    pub(crate) fn new(shared: Arc<Shared>, key: CanonicalKey) -> Self {
        Self {
            shared,
            key,
            pending: None,
            current: None,
        }
    }

    pub(crate) async fn next(&mut self) -> WalResult<Option<Bytes>> {
        if self.pending.is_none() {
            self.shared.ensure_open()?;
            self.pending = Some(lock_segments(&self.shared).await);
        }

        loop {
            if let Some(current) = self.current.as_mut() {
                if let Some(block) = current.blocks.pop_front() {
                    match read_block(&self.shared, current, &block).await? {
                        Some(body) => return Ok(Some(body)),
                        None => continue,
                    }
                }
                // Done with this segment; release its lock.
                self.current = None;
            }

            let Some(locked) = self.pending.as_mut().and_then(VecDeque::pop_front) else {
                return Ok(None);
            };
            let blocks = locked.segment.index().lookup(&self.key);
            self.current = Some(Current {
                locked,
                blocks: blocks.into(),
                reader: None,
            });
        }
    }
}

/// Reads one block; `None` for a block whose append failed.
async fn read_block(
    shared: &Shared,
    current: &mut Current,
    block: &BlockRef,
) -> WalResult<Option<Bytes>> {
    let (position, length) = match block.state() {
        BlockState::Buffered(body) => return Ok(Some(body)),
        BlockState::OnDisk { position, length } => (position, length),
        BlockState::Discarded => return Ok(None),
    };

    let path = current.locked.segment.path();
    let reader = match current.reader.take() {
        Some(reader) => reader,
        None => SegmentReader::open(path).await?,
    };
    let reader = current.reader.insert(reader);

    let bytes = reader.read_at(position, length as usize).await?;
    if bytes.len() < length as usize {
        return Err(WalError::BlockShortRead {
            filename: path.to_path_buf(),
            expected: length,
            actual: bytes.len(),
        });
    }

    let frame = match shared.decoder.split(&bytes) {
        Ok(Some(frame)) => frame,
        Ok(None) => return Err(WalError::block_missing(path, "no complete record")),
        Err(err) => return Err(WalError::from_codec(path, err)),
    };
    if frame.length != bytes.len() {
        return Err(WalError::block_missing(path, "more than one record"));
    }
    frame
        .parts
        .into_iter()
        .nth(1)
        .map(Some)
        .ok_or_else(|| WalError::block_missing(path, "record has no body"))
}

/// Yields every record of the oldest segment.
pub(crate) struct HeadCursor {
    shared: Arc<Shared>,
    state: HeadState,
}

enum HeadState {
    Start,
    Scanning {
        scanner: FrameScanner,
        locked: LockedSegment,
    },
    Done,
}

impl HeadCursor {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            state: HeadState::Start,
        }
    }

    pub(crate) async fn next(&mut self) -> WalResult<Option<HeadEntry>> {
        if matches!(self.state, HeadState::Start) {
            self.state = HeadState::Done;
            self.shared.ensure_open()?;

            let segments = self.shared.segments_snapshot();
            if segments.len() > 1 {
                let segment = Arc::clone(&segments[0]);
                let guard = segment.lock.share().await;
                if !segment.is_shifted() {
                    let scanner = FrameScanner::open(
                        segment.path(),
                        self.shared.decoder.clone(),
                        self.shared.read_buffer_size,
                    )
                    .await?;
                    self.state = HeadState::Scanning {
                        scanner,
                        locked: LockedSegment {
                            segment,
                            _guard: guard,
                        },
                    };
                }
            }
        }

        let HeadState::Scanning { scanner, locked } = &mut self.state else {
            return Ok(None);
        };
        let path = locked.segment.path().to_path_buf();
        match scanner.next_frame().await {
            Ok(Some(scanned)) => {
                let mut parts = scanned.frame.parts.into_iter();
                let (Some(keys), Some(body)) = (parts.next(), parts.next()) else {
                    let err = WalError::block_missing(&path, "record has no body");
                    self.state = HeadState::Done;
                    return Err(err);
                };
                match decode_keys(&keys) {
                    Ok(keys) => Ok(Some(HeadEntry { keys, body })),
                    Err(err) => {
                        let err = WalError::from_codec(&path, err);
                        self.state = HeadState::Done;
                        Err(err)
                    }
                }
            }
            Ok(None) => {
                self.state = HeadState::Done;
                Ok(None)
            }
            Err(err) => {
                self.state = HeadState::Done;
                Err(err)
            }
        }
    }
}
