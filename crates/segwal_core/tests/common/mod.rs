//! Shared helpers for the integration tests.

#![allow(dead_code)]

use futures::TryStreamExt;
use segwal_core::{Bytes, Entry, HeadEntry, Key, NoSync, WalConfig, WalResult, WriteAheadLog};
use std::path::Path;

/// Opens a log in `path` without fsync so tests stay fast.
pub async fn open(path: &Path) -> WriteAheadLog {
    WriteAheadLog::open(config(path))
        .await
        .expect("open write-ahead log")
}

/// Test configuration: no fsync, small read chunks to exercise carry-over.
pub fn config(path: &Path) -> WalConfig {
    WalConfig::new(path)
        .sync_strategy(NoSync)
        .read_buffer_size(64)
}

/// Builds an entry from integer keys and a text body.
pub fn entry(keys: &[i64], body: &str) -> Entry {
    Entry::new(keys.iter().copied(), body.to_string())
}

/// Collects the bodies under an integer key.
pub async fn get(wal: &WriteAheadLog, key: i64) -> WalResult<Vec<Bytes>> {
    wal.get(&Key::from(key)).try_collect().await
}

/// Collects the bodies under an integer key as strings.
pub async fn get_strings(wal: &WriteAheadLog, key: i64) -> Vec<String> {
    get(wal, key)
        .await
        .expect("read key")
        .into_iter()
        .map(|body| String::from_utf8(body.to_vec()).expect("utf-8 body"))
        .collect()
}

/// Collects the records of the oldest segment.
pub async fn head(wal: &WriteAheadLog) -> Vec<HeadEntry> {
    wal.head().try_collect().await.expect("read head")
}

/// Installs a tracing subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
