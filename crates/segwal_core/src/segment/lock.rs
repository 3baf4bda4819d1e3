//! Reader/retirement lock for one segment.
//!
//! ```text
//!            share()               release (n == 1)
//!   Idle ────────────▶ Shared(1) ───────────────────▶ Idle
//!    │                   │  ▲
//!    │ exclude()         │  │ share() / release (n > 1)
//!    ▼                   ▼  │
//!   Exclusive          Shared(n)
//! ```
//!
//! Any number of readers may hold the lock together, or one retirement may
//! hold it alone. While a retirement is waiting, new readers queue behind
//! it so it cannot be starved.
//!
//! The lock is acquired by readers across many segments in one pass and
//! held for the life of a stream, so it hands out owned guards rather than
//! borrowing like a `RwLock`.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Shared(usize),
    Exclusive,
}

#[derive(Debug)]
struct State {
    mode: Mode,
    waiting_exclusive: usize,
}

/// A shared/exclusive lock with owned guards.
#[derive(Debug)]
pub(crate) struct SegmentLock {
    state: Mutex<State>,
    released: Notify,
}

impl SegmentLock {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                mode: Mode::Idle,
                waiting_exclusive: 0,
            }),
            released: Notify::new(),
        })
    }

    /// Waits for shared access.
    pub(crate) async fn share(self: &Arc<Self>) -> SharedGuard {
        loop {
            // Register before checking so a release in between is not missed.
            let released = self.released.notified();
            {
                let mut state = self.state.lock();
                if state.waiting_exclusive == 0 {
                    match state.mode {
                        Mode::Idle => {
                            state.mode = Mode::Shared(1);
                            return SharedGuard {
                                lock: Arc::clone(self),
                            };
                        }
                        Mode::Shared(n) => {
                            state.mode = Mode::Shared(n + 1);
                            return SharedGuard {
                                lock: Arc::clone(self),
                            };
                        }
                        Mode::Exclusive => {}
                    }
                }
            }
            released.await;
        }
    }

    /// Waits for exclusive access.
    pub(crate) async fn exclude(self: &Arc<Self>) -> ExclusiveGuard {
        let _waiting = Waiting::register(self);
        loop {
            let released = self.released.notified();
            {
                let mut state = self.state.lock();
                if state.mode == Mode::Idle {
                    state.mode = Mode::Exclusive;
                    return ExclusiveGuard {
                        lock: Arc::clone(self),
                    };
                }
            }
            released.await;
        }
    }

    fn release_shared(&self) {
        let mut state = self.state.lock();
        state.mode = match state.mode {
            Mode::Shared(n) if n > 1 => Mode::Shared(n - 1),
            _ => Mode::Idle,
        };
        if state.mode == Mode::Idle {
            drop(state);
            self.released.notify_waiters();
        }
    }

    fn release_exclusive(&self) {
        self.state.lock().mode = Mode::Idle;
        self.released.notify_waiters();
    }

    #[cfg(test)]
    fn mode(&self) -> Mode {
        self.state.lock().mode
    }
}

/// Counts a pending exclusive acquisition, even if the waiter is dropped.
struct Waiting<'a> {
    lock: &'a SegmentLock,
}

impl<'a> Waiting<'a> {
    fn register(lock: &'a SegmentLock) -> Self {
        lock.state.lock().waiting_exclusive += 1;
        Self { lock }
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock();
        state.waiting_exclusive -= 1;
        let wake = state.waiting_exclusive == 0 && state.mode != Mode::Exclusive;
        drop(state);
        if wake {
            // Readers parked behind an abandoned retirement may proceed.
            self.lock.released.notify_waiters();
        }
    }
}

/// Shared access; released on drop.
#[derive(Debug)]
pub(crate) struct SharedGuard {
    lock: Arc<SegmentLock>,
}

impl Drop for SharedGuard {
    fn drop(&mut self) {
        self.lock.release_shared();
    }
}

/// Exclusive access; released on drop.
#[derive(Debug)]
pub(crate) struct ExclusiveGuard {
    lock: Arc<SegmentLock>,
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        self.lock.release_exclusive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn shared_holders_stack() {
        let lock = SegmentLock::new();

        let first = lock.share().await;
        let second = lock.share().await;
        assert_eq!(lock.mode(), Mode::Shared(2));

        drop(first);
        assert_eq!(lock.mode(), Mode::Shared(1));
        drop(second);
        assert_eq!(lock.mode(), Mode::Idle);
    }

    #[tokio::test]
    async fn exclusive_waits_for_readers() {
        let lock = SegmentLock::new();
        let reader = lock.share().await;

        let pending = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let _guard = lock.exclude().await;
            })
        };

        tokio::time::sleep(SHORT).await;
        assert!(!pending.is_finished());

        drop(reader);
        timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lock.mode(), Mode::Idle);
    }

    #[tokio::test]
    async fn readers_queue_behind_waiting_exclusive() {
        let lock = SegmentLock::new();
        let reader = lock.share().await;

        let exclusive = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move { lock.exclude().await })
        };
        tokio::time::sleep(SHORT).await;

        // A new reader is not admitted while the retirement waits.
        assert!(timeout(SHORT, lock.share()).await.is_err());

        drop(reader);
        let guard = timeout(Duration::from_secs(5), exclusive)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lock.mode(), Mode::Exclusive);

        drop(guard);
        let _reader = timeout(Duration::from_secs(5), lock.share())
            .await
            .unwrap();
        assert_eq!(lock.mode(), Mode::Shared(1));
    }

    #[tokio::test]
    async fn exclusive_blocks_readers() {
        let lock = SegmentLock::new();
        let guard = lock.exclude().await;

        assert!(timeout(SHORT, lock.share()).await.is_err());
        drop(guard);
        timeout(SHORT, lock.share()).await.unwrap();
    }

    #[tokio::test]
    async fn abandoned_exclusive_unblocks_readers() {
        let lock = SegmentLock::new();
        let reader = lock.share().await;

        // Give up waiting for exclusive access.
        assert!(timeout(SHORT, lock.exclude()).await.is_err());

        let _second = timeout(SHORT, lock.share()).await.unwrap();
        drop(reader);
        assert_eq!(lock.mode(), Mode::Shared(1));
    }
}
