//! Blocking FIFO shared by producers and one or more consuming workers.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use super::WorkerError;

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Mutex-guarded deque plus a condition variable.
///
/// The lock is held only to push or pop; items run outside it.
#[derive(Debug)]
pub(crate) struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T> BlockingQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append an item and wake one waiting consumer.
    pub(crate) fn push(&self, item: T) -> Result<(), WorkerError> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(WorkerError::QueueClosed);
            }
            inner.items.push_back(item);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Block until an item is available.
    ///
    /// Returns `None` once the queue is closed and empty; items queued before
    /// `close` are still handed out.
    pub(crate) fn pop(&self) -> Option<T> {
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
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop accepting items and wake every consumer so idle ones can exit.
    ///
    /// Returns `false` if the queue was already closed.
    pub(crate) fn close(&self) -> bool {
        let was_open = {
            let mut inner = self.lock();
            !std::mem::replace(&mut inner.closed, true)
        };
        self.available.notify_all();
        was_open
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().items.len()
    }

    // Items are plain data moved in and out whole, so a poisoned lock still
    // guards a consistent deque.
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
