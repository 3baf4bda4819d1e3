//! Segment replay.
//!
//! On open every segment is scanned front to back and each record is
//! indexed under the keys stored in its first part. Any I/O, checksum, or
//! framing failure aborts recovery.
//!
//! A record cut short by a crash leaves a torn tail. On the last segment,
//! which will receive new appends, the tail is truncated away so that
//! later records start on a record boundary. On older segments it is only
//! reported.

use super::scan::FrameScanner;
use crate::error::{WalError, WalResult};
use crate::index::{canonical_keys, BlockRef, KeyIndex};
use segwal_codec::{decode_keys, FrameDecoder};
use std::path::Path;
use tracing::{debug, warn};

/// Outcome of replaying one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReplayStats {
    /// Records indexed.
    pub records: usize,
    /// Length of the segment after any truncation.
    pub length: u64,
    /// Bytes of torn tail found at the end of the file.
    pub trailing: usize,
}

/// Replays segment `id` into its `index`.
///
/// When `truncate_tail` is set a torn tail is removed from the file.
pub(crate) async fn replay(
    id: u64,
    path: &Path,
    decoder: FrameDecoder,
    chunk_size: usize,
    index: &KeyIndex,
    truncate_tail: bool,
) -> WalResult<ReplayStats> {
    let mut scanner = FrameScanner::open(path, decoder, chunk_size).await?;
    let mut records = 0usize;
    while let Some(scanned) = scanner.next_frame().await? {
        let Some(key_part) = scanned.frame.parts.first() else {
            return Err(WalError::block_missing(path, "record has no parts"));
        };
        if scanned.frame.parts.len() < 2 {
            return Err(WalError::block_missing(path, "record has no body"));
        }
        let keys = decode_keys(key_part).map_err(|e| WalError::from_codec(path, e))?;
        let length = u32::try_from(scanned.frame.length)
            .map_err(|_| WalError::block_missing(path, "record length exceeds u32"))?;

        let block = BlockRef::on_disk(scanned.position, length);
        index.insert(&canonical_keys(&keys), &block);
        records += 1;
    }

    let mut length = scanner.position();
    let trailing = scanner.trailing();
    if trailing > 0 {
        warn!(
            segment = id,
            position = length,
            bytes = trailing,
            truncated = truncate_tail,
            "Incomplete record at end of segment"
        );
        if truncate_tail {
            segwal_storage::truncate(path, length).await?;
        } else {
            length += trailing as u64;
        }
    }

    debug!(segment = id, records, length, "Replayed segment");

    Ok(ReplayStats {
        records,
        length,
        trailing,
    })
}
