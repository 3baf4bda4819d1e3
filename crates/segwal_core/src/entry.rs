//! Entries written to and read back from the log.

use bytes::Bytes;
use segwal_codec::Key;

/// A unit of data written to the log.
///
/// The body is retrievable under every one of its keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Lookup keys; duplicates are indexed once.
    pub keys: Vec<Key>,
    /// Opaque payload.
    pub body: Bytes,
}

impl Entry {
    /// Creates an entry from anything convertible to keys and a body.
    ///
    /// ```
    /// use segwal_core::Entry;
    ///
    /// let entry = Entry::new([0, 1], "a");
    /// assert_eq!(entry.keys.len(), 2);
    /// assert_eq!(&entry.body[..], b"a");
    /// ```
    pub fn new<K, B>(keys: impl IntoIterator<Item = K>, body: B) -> Self
    where
        K: Into<Key>,
        B: Into<Bytes>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            body: body.into(),
        }
    }
}

/// A record of the oldest segment, as yielded by
/// [`WriteAheadLog::head`](crate::WriteAheadLog::head).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadEntry {
    /// The keys the entry was written under.
    pub keys: Vec<Key>,
    /// The entry body.
    pub body: Bytes,
}
