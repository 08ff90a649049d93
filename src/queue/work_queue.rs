//! FIFO of URLs waiting for a worker
//!
//! Producers push from any thread; consumers block in [`WorkQueue::take`] until
//! an item arrives, the queue is closed and drained, or their cancellation
//! token fires. Takers register for a wakeup before inspecting the queue, so a
//! push or close between the check and the wait is never missed.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Inner {
    items: VecDeque<String>,
    closed: bool,
}

/// Multi-producer, multi-consumer queue with close-for-adding semantics
#[derive(Debug, Default)]
pub struct WorkQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a URL; returns false once the queue is closed for adding
    pub fn push(&self, url: String) -> bool {
        {
            let mut inner = self.inner();
            if inner.closed {
                return false;
            }
            inner.items.push_back(url);
        }
        self.notify.notify_one();
        true
    }

    /// Closes the queue for adding. Remaining items can still be taken; once
    /// they are gone every blocked taker returns `None`.
    pub fn close(&self) {
        self.inner().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner().closed
    }

    /// Waits for the next URL
    ///
    /// Returns `None` when `cancel` fires or when the queue is closed and empty.
    pub async fn take(&self, cancel: &CancellationToken) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                return None;
            }

            {
                let mut inner = self.inner();
                if let Some(url) = inner.items.pop_front() {
                    return Some(url);
                }
                if inner.closed {
                    return None;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    /// Copy of the queued URLs in take order
    pub fn snapshot(&self) -> Vec<String> {
        self.inner().items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().items.is_empty()
    }
}
