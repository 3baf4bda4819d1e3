//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use bytes::Bytes;
use rand::Rng;
use segwal_core::Entry;

/// Generate a random body of the specified size.
pub fn random_body(size: usize) -> Bytes {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen::<u8>()).collect::<Vec<_>>().into()
}

/// Generate `count` entries spread over `keys` integer keys.
pub fn generate_entries(count: usize, keys: usize, body_size: usize) -> Vec<Entry> {
    let keys = keys.max(1);
    (0..count)
        .map(|i| Entry::new([(i % keys) as i64], random_body(body_size)))
        .collect()
}

/// A multi-threaded runtime for async benchmarks.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}
