//! In-memory key index.
//!
//! Every segment owns one [`KeyIndex`] mapping `canonical key -> [BlockRef]`.
//! Lists only ever grow at the end, so a reader that clones a list gets a
//! stable point-in-time view while the writer keeps appending. The index of
//! a retired segment goes away with the segment itself.

use bytes::Bytes;
use parking_lot::RwLock;
use segwal_codec::CanonicalKey;
use std::collections::HashMap;
use std::sync::Arc;

/// Where the bytes of an indexed record currently live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BlockState {
    /// Written but not yet appended; holds the entry body.
    Buffered(Bytes),
    /// Appended to the segment file at `position`, spanning `length` bytes
    /// of framed record.
    OnDisk {
        /// Offset of the record within the segment file.
        position: u64,
        /// Framed length of the record.
        length: u32,
    },
    /// The append failed; the record never reached the segment.
    Discarded,
}

/// One indexed record.
///
/// Shared between every key the record was written under, so the flush
/// transition is observed by all of them at once.
#[derive(Debug)]
pub(crate) struct BlockRef {
    state: RwLock<BlockState>,
}

impl BlockRef {
    pub(crate) fn buffered(body: Bytes) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(BlockState::Buffered(body)),
        })
    }

    pub(crate) fn on_disk(position: u64, length: u32) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(BlockState::OnDisk { position, length }),
        })
    }

    /// Returns a copy of the current state.
    pub(crate) fn state(&self) -> BlockState {
        self.state.read().clone()
    }

    /// Records where the block landed and drops the in-memory body.
    pub(crate) fn persist(&self, position: u64, length: u32) {
        *self.state.write() = BlockState::OnDisk { position, length };
    }

    /// Hides a block whose append failed from every reader.
    pub(crate) fn discard(&self) {
        *self.state.write() = BlockState::Discarded;
    }
}

/// Index of one segment: canonical key to the blocks written under it.
#[derive(Debug, Default)]
pub(crate) struct KeyIndex {
    keys: RwLock<HashMap<CanonicalKey, Vec<Arc<BlockRef>>>>,
}

impl KeyIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends `block` under every key.
    pub(crate) fn insert(&self, keys: &[CanonicalKey], block: &Arc<BlockRef>) {
        let mut index = self.keys.write();
        for key in keys {
            index.entry(key.clone()).or_default().push(Arc::clone(block));
        }
    }

    /// Returns a snapshot of the blocks under `key`.
    pub(crate) fn lookup(&self, key: &CanonicalKey) -> Vec<Arc<BlockRef>> {
        self.keys.read().get(key).cloned().unwrap_or_default()
    }

    /// Number of distinct keys indexed.
    #[cfg(test)]
    pub(crate) fn key_count(&self) -> usize {
        self.keys.read().len()
    }
}

/// Canonicalizes `keys`, dropping duplicates while keeping first-seen order.
pub(crate) fn canonical_keys(keys: &[segwal_codec::Key]) -> Vec<CanonicalKey> {
    let mut out: Vec<CanonicalKey> = Vec::with_capacity(keys.len());
    for key in keys {
        let token = key.canonical();
        if !out.contains(&token) {
            out.push(token);
        }
    }
    out
}
