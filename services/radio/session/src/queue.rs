//! Bounded queue that drops the oldest entry when full.
//!
//! Push-style links (BLE notifications, broker callbacks) deliver messages
//! from a context that must not block. When the consumer falls behind, the
//! oldest buffered message is discarded so the newest state always gets
//! through.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Result, SessionError};

/// Default number of buffered messages
pub const DEFAULT_QUEUE_CAPACITY: usize = 120;

/// Bounded multi-producer queue with drop-oldest overflow
#[derive(Debug)]
pub struct DropOldestQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl<T> DropOldestQueue<T> {
    /// Create a queue holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry without blocking.
    ///
    /// Returns `false` when the queue is closed and the entry was discarded.
    pub fn push(&self, item: T) -> bool {
        if self.is_closed() {
            return false;
        }

        {
            let mut items = self.lock();
            if items.len() >= self.capacity {
                items.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(component = "push", dropped, "Queue full, dropped oldest entry");
            }
            items.push_back(item);
        }

        self.notify.notify_waiters();
        true
    }

    /// Take the next entry if one is buffered
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Wait for the next entry.
    ///
    /// Buffered entries are still handed out after [`close`](Self::close);
    /// once the queue is drained it reports [`SessionError::Closed`].
    pub async fn pop(&self, cancel: &CancellationToken) -> Result<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push between the check and the
            // await is not missed.
            notified.as_mut().enable();

            if let Some(item) = self.try_pop() {
                return Ok(item);
            }
            if self.is_closed() {
                return Err(SessionError::Closed);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                _ = notified => {}
            }
        }
    }

    /// Stop accepting entries and wake every waiter
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(component = "push", "Queue closed");
        }
        self.notify.notify_waiters();
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of buffered entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_overflow_drops_oldest() {
        let queue = DropOldestQueue::new(3);
        let cancel = CancellationToken::new();

        // N + 1 pushes into a queue of N keep the newest N
        for i in 0..4 {
            assert!(queue.push(i));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 1);

        assert_eq!(queue.pop(&cancel).await.unwrap(), 1);
        assert_eq!(queue.pop(&cancel).await.unwrap(), 2);
        assert_eq!(queue.pop(&cancel).await.unwrap(), 3);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(DropOldestQueue::new(DEFAULT_QUEUE_CAPACITY));
        let cancel = CancellationToken::new();

        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push("late");
        });

        let item = tokio::time::timeout(Duration::from_secs(1), queue.pop(&cancel))
            .await
            .expect("pop should complete")
            .unwrap();
        assert_eq!(item, "late");
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let queue: DropOldestQueue<u32> = DropOldestQueue::new(4);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        assert!(matches!(queue.pop(&cancel).await, Err(SessionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_close_drains_then_reports_closed() {
        let queue = DropOldestQueue::new(4);
        let cancel = CancellationToken::new();

        queue.push(7u32);
        queue.close();
        assert!(!queue.push(8));

        assert_eq!(queue.pop(&cancel).await.unwrap(), 7);
        assert!(matches!(queue.pop(&cancel).await, Err(SessionError::Closed)));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = DropOldestQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.try_pop(), Some(2));
    }
}
