use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;

use crate::error::{QmcError, QmcResult};

/// A fixed-capacity FIFO queue, the Rust stand-in for a FreeRTOS message
/// queue (spec §4.1: `queue_create`/`queue_send`/`queue_recv`/
/// `queue_send_front`).
///
/// Capacity is set once at construction and never grows; a full queue
/// makes `send` block (or time out) rather than allocate, matching the
/// "no dynamic allocation on the hot path" constraint.
pub struct Queue<T> {
    capacity: usize,
    inner: Mutex<VecDeque<T>>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> Queue<T> {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Appends to the back. Blocks until space is available or `timeout`
    /// elapses; `Duration::ZERO` is the non-blocking form used by
    /// `log_queue_entry` and friends.
    pub async fn send(&self, item: T, to: Duration) -> QmcResult<()> {
        self.send_impl(item, to, false).await
    }

    /// Inserts at the front, skipping ahead of anything already queued.
    /// Used by the log pipeline's `priority=true` path (spec §4.5, §5).
    pub async fn send_front(&self, item: T, to: Duration) -> QmcResult<()> {
        self.send_impl(item, to, true).await
    }

    async fn send_impl(&self, item: T, to: Duration, front: bool) -> QmcResult<()> {
        let deadline = tokio::time::Instant::now() + to;
        loop {
            {
                let mut guard = self.inner.lock().await;
                if guard.len() < self.capacity {
                    if front {
                        guard.push_front(item);
                    } else {
                        guard.push_back(item);
                    }
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }
            if to.is_zero() {
                return Err(QmcError::NoMem);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(QmcError::Timeout);
            }
            if timeout(remaining, self.not_full.notified()).await.is_err() {
                return Err(QmcError::Timeout);
            }
        }
    }

    /// Pops the front item, blocking up to `to`. `Duration::ZERO` is the
    /// non-blocking form, returning `NoMsg` immediately if empty.
    pub async fn recv(&self, to: Duration) -> QmcResult<T> {
        let deadline = tokio::time::Instant::now() + to;
        loop {
            {
                let mut guard = self.inner.lock().await;
                if let Some(item) = guard.pop_front() {
                    self.not_full.notify_one();
                    return Ok(item);
                }
            }
            if to.is_zero() {
                return Err(QmcError::NoMsg);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(QmcError::Timeout);
            }
            if timeout(remaining, self.not_empty.notified()).await.is_err() {
                return Err(QmcError::Timeout);
            }
        }
    }

    /// Non-blocking peek at the front item without removing it, used by
    /// the DataHub command loop (spec §4.2) which must leave the command
    /// in place on `Interrupted`.
    pub async fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.lock().await.front().cloned()
    }

    /// Removes and discards the front item unconditionally; used once a
    /// peeked command has been applied successfully.
    pub async fn pop_front_discard(&self) {
        let mut guard = self.inner.lock().await;
        if guard.pop_front().is_some() {
            self.not_full.notify_one();
        }
    }

    /// Drains every queued item, in FIFO order. Used by the log task's
    /// power-loss shutdown path (spec §4.5) and `log_format`.
    pub async fn drain(&self) -> Vec<T> {
        let mut guard = self.inner.lock().await;
        let items = guard.drain(..).collect();
        self.not_full.notify_waiters();
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order_preserved() {
        let q = Queue::new(4);
        q.send(1, Duration::ZERO).await.unwrap();
        q.send(2, Duration::ZERO).await.unwrap();
        assert_eq!(q.recv(Duration::ZERO).await.unwrap(), 1);
        assert_eq!(q.recv(Duration::ZERO).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn send_front_jumps_the_line() {
        let q = Queue::new(4);
        q.send(1, Duration::ZERO).await.unwrap();
        q.send_front(2, Duration::ZERO).await.unwrap();
        assert_eq!(q.recv(Duration::ZERO).await.unwrap(), 2);
        assert_eq!(q.recv(Duration::ZERO).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn full_queue_nonblocking_send_is_nomem() {
        let q: Arc<Queue<u8>> = Queue::new(1);
        q.send(1, Duration::ZERO).await.unwrap();
        let err = q.send(2, Duration::ZERO).await.unwrap_err();
        assert_eq!(err, QmcError::NoMem);
    }

    #[tokio::test]
    async fn empty_queue_nonblocking_recv_is_nomsg() {
        let q: Arc<Queue<u8>> = Queue::new(1);
        let err = q.recv(Duration::ZERO).await.unwrap_err();
        assert_eq!(err, QmcError::NoMsg);
    }

    #[tokio::test]
    async fn recv_times_out_on_persistently_empty_queue() {
        let q: Arc<Queue<u8>> = Queue::new(1);
        let err = q.recv(Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(err, QmcError::Timeout);
    }
}
