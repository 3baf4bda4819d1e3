//! Log segments.
//!
//! A segment is one append-only file named by its id. The open log keeps
//! an ordered list of segments; the last one is the active segment that
//! receives appends, the first one is the next to be retired.
//!
//! Each segment carries its own key index, so an id reused after every
//! segment has been retired starts from an empty index.

mod lock;
pub(crate) mod recovery;
pub(crate) mod scan;

pub(crate) use lock::{SegmentLock, SharedGuard};

use crate::index::KeyIndex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One segment of the log.
#[derive(Debug)]
pub(crate) struct Segment {
    id: u64,
    path: PathBuf,
    shifted: AtomicBool,
    index: KeyIndex,
    pub(crate) lock: Arc<SegmentLock>,
}

impl Segment {
    pub(crate) fn new(id: u64, path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            id,
            path,
            shifted: AtomicBool::new(false),
            index: KeyIndex::new(),
            lock: SegmentLock::new(),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn index(&self) -> &KeyIndex {
        &self.index
    }

    /// Whether the segment has been retired. Never reset once set.
    pub(crate) fn is_shifted(&self) -> bool {
        self.shifted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_shifted(&self) {
        self.shifted.store(true, Ordering::Release);
    }
}
