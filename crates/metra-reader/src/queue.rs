//! Bounded blocking queue with an explicit overflow policy.
//!
//! Producers never block: when the queue is full the configured
//! [`OverflowPolicy`] decides which item is dropped. Consumers block in
//! [`BoundedQueue::pop`] until an item arrives or the queue is closed.
//! Closing lets the consumer drain what was queued before the close.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Which item to drop when pushing into a full queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Discard the oldest queued item to make room.
    #[default]
    DropOldest,
    /// Discard the item being pushed.
    DropNewest,
}

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after dropping the oldest item.
    DroppedOldest,
    /// Not queued; the queue was full.
    DroppedNewest,
    /// Not queued; the queue is closed.
    Closed,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity multi-producer queue.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A panic while holding the lock cannot leave the VecDeque invalid
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add an item without blocking.
    pub fn push(&self, item: T) -> PushOutcome {
        let mut inner = self.lock();
        if inner.closed {
            return PushOutcome::Closed;
        }

        let outcome = if inner.items.len() < self.capacity {
            PushOutcome::Queued
        } else {
            match self.policy {
                OverflowPolicy::DropNewest => return PushOutcome::DroppedNewest,
                OverflowPolicy::DropOldest => {
                    inner.items.pop_front();
                    PushOutcome::DroppedOldest
                }
            }
        };

        inner.items.push_back(item);
        drop(inner);
        self.available.notify_one();
        outcome
    }

    /// Take the next item, blocking until one is available.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            inner = self
                .available
                .wait(inner)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let inner = self.lock();
        let (mut inner, _) = self
            .available
            .wait_timeout_while(inner, timeout, |inner| {
                inner.items.is_empty() && !inner.closed
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.items.pop_front()
    }

    /// Refuse further pushes and wake all consumers.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    /// Reopen a closed queue, discarding leftovers.
    pub fn reopen(&self) {
        let mut inner = self.lock();
        inner.items.clear();
        inner.closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(4, OverflowPolicy::DropOldest);
        for i in 0..3 {
            assert_eq!(queue.push(i), PushOutcome::Queued);
        }
        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let queue = BoundedQueue::new(2, OverflowPolicy::DropOldest);
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.push(3), PushOutcome::DroppedOldest);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
    }

    #[test]
    fn test_drop_newest_when_full() {
        let queue = BoundedQueue::new(2, OverflowPolicy::DropNewest);
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.push(3), PushOutcome::DroppedNewest);

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn test_close_drains_then_ends() {
        let queue = BoundedQueue::new(4, OverflowPolicy::DropOldest);
        queue.push("a");
        queue.close();

        assert_eq!(queue.push("b"), PushOutcome::Closed);
        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(BoundedQueue::new(4, OverflowPolicy::DropOldest));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(42);
        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let queue: Arc<BoundedQueue<u8>> = Arc::new(BoundedQueue::new(1, OverflowPolicy::DropOldest));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_pop_timeout() {
        let queue: BoundedQueue<u8> = BoundedQueue::new(1, OverflowPolicy::DropOldest);
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)), None);
        queue.push(7);
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)), Some(7));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let queue = BoundedQueue::new(0, OverflowPolicy::DropOldest);
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.push(1), PushOutcome::Queued);
        assert_eq!(queue.push(2), PushOutcome::DroppedOldest);
    }
}
