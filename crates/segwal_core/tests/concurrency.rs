//! Concurrent writers, readers, and retirement.

mod common;

use common::{entry, get_strings, open};
use futures::{StreamExt, TryStreamExt};
use segwal_core::{Bytes, Key};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_keep_per_writer_order() {
    let temp = tempdir().unwrap();
    let wal = Arc::new(open(temp.path()).await);

    let mut tasks = Vec::new();
    for writer in 0..4i64 {
        let wal = Arc::clone(&wal);
        tasks.push(tokio::spawn(async move {
            for i in 0..50 {
                wal.write(vec![entry(&[writer], &format!("{i}"))], i % 7 == 0)
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
    for writer in 0..4 {
        assert_eq!(get_strings(&wal, writer).await, expected);
    }
    wal.close().await.unwrap();

    let wal = open(temp.path()).await;
    for writer in 0..4 {
        assert_eq!(get_strings(&wal, writer).await, expected);
    }
    wal.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rotations_interleaved_with_writes_lose_nothing() {
    let temp = tempdir().unwrap();
    let wal = Arc::new(open(temp.path()).await);

    let writer = {
        let wal = Arc::clone(&wal);
        tokio::spawn(async move {
            for i in 0..200 {
                wal.write(vec![entry(&[1], &format!("{i}"))], false)
                    .await
                    .unwrap();
            }
        })
    };
    let rotator = {
        let wal = Arc::clone(&wal);
        tokio::spawn(async move {
            for _ in 0..10 {
                wal.rotate().await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    writer.await.unwrap();
    rotator.await.unwrap();

    let expected: Vec<String> = (0..200).map(|i| i.to_string()).collect();
    assert_eq!(get_strings(&wal, 1).await, expected);
    assert_eq!(wal.segment_ids().len(), 11);
    wal.close().await.unwrap();

    let wal = open(temp.path()).await;
    assert_eq!(get_strings(&wal, 1).await, expected);
    wal.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shift_waits_for_open_readers() {
    let temp = tempdir().unwrap();
    let wal = open(temp.path()).await;

    wal.write(vec![entry(&[1], "old-1"), entry(&[1], "old-2")], true)
        .await
        .unwrap();
    wal.rotate().await.unwrap();
    wal.write(vec![entry(&[1], "new")], true).await.unwrap();

    // Take the first body: the stream now holds both segments.
    let mut reader = wal.get(&Key::from(1));
    assert_eq!(reader.next().await.unwrap().unwrap(), "old-1");

    let shift = wal.shift();
    let shift = tokio::spawn(shift);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!shift.is_finished());
    assert!(temp.path().join("0").exists());

    // The reader still sees the rest of the retiring segment.
    let rest: Vec<Bytes> = reader.by_ref().try_collect().await.unwrap();
    assert_eq!(rest, vec!["old-2", "new"]);
    drop(reader);

    assert!(tokio::time::timeout(Duration::from_secs(5), shift)
        .await
        .unwrap()
        .unwrap()
        .unwrap());
    assert_eq!(get_strings(&wal, 1).await, ["new"]);
    wal.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_reader_releases_segments() {
    let temp = tempdir().unwrap();
    let wal = open(temp.path()).await;

    wal.write(vec![entry(&[1], "a"), entry(&[1], "b")], true)
        .await
        .unwrap();
    wal.rotate().await.unwrap();

    let mut reader = wal.get(&Key::from(1));
    assert_eq!(reader.next().await.unwrap().unwrap(), "a");
    drop(reader);

    let shifted = tokio::time::timeout(Duration::from_secs(5), wal.shift())
        .await
        .unwrap()
        .unwrap();
    assert!(shifted);
    wal.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_run_alongside_writes() {
    let temp = tempdir().unwrap();
    let wal = Arc::new(open(temp.path()).await);

    let writer = {
        let wal = Arc::clone(&wal);
        tokio::spawn(async move {
            for i in 0..100 {
                wal.write(vec![entry(&[1], &format!("{i}"))], false)
                    .await
                    .unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let wal = Arc::clone(&wal);
        readers.push(tokio::spawn(async move {
            for _ in 0..20 {
                let seen = get_strings(&wal, 1).await;
                // Every read is a prefix of the write order.
                for (i, body) in seen.iter().enumerate() {
                    assert_eq!(body, &i.to_string());
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(get_strings(&wal, 1).await.len(), 100);
    wal.close().await.unwrap();
}

#[tokio::test]
async fn close_drains_queued_writes() {
    let temp = tempdir().unwrap();
    let wal = open(temp.path()).await;

    let pending: Vec<_> = (0..20)
        .map(|i| wal.write(vec![entry(&[1], &format!("{i}"))], false))
        .collect();
    wal.close().await.unwrap();
    for write in pending {
        write.await.unwrap();
    }

    let wal = open(temp.path()).await;
    assert_eq!(get_strings(&wal, 1).await.len(), 20);
    wal.close().await.unwrap();
}
