use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of a blocking take
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wait<T> {
    Ready(T),
    /// The queue was closed and everything pushed before the close was taken
    Closed,
    TimedOut,
}

/// Unbounded FIFO with close-aware blocking takes.
///
/// Pushing never blocks. Takes block on a condition variable until an item is
/// available, the queue is closed, or an optional timeout expires. Items pushed
/// before `close` are still handed out; pushes after `close` are dropped.
pub struct BlockingQueue<T> {
    inner: Mutex<QueueInner<T>>,
    available: Condvar,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append one item. Returns false if the queue is closed.
    pub fn push(&self, item: T) -> bool {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return false;
        }
        inner.items.push_back(item);
        self.available.notify_one();
        true
    }

    /// Append items in order under a single lock. Returns false if the queue is closed.
    pub fn extend<I: IntoIterator<Item = T>>(&self, items: I) -> bool {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return false;
        }
        let before = inner.items.len();
        inner.items.extend(items);
        if inner.items.len() > before {
            self.available.notify_one();
        }
        true
    }

    /// Take the oldest item, blocking until one is available
    pub fn pop(&self, timeout: Option<Duration>) -> Wait<T> {
        let mut inner = match self.wait_ready(timeout) {
            Ok(inner) => inner,
            Err(end) => return end,
        };
        match inner.items.pop_front() {
            Some(item) => Wait::Ready(item),
            None => Wait::Closed,
        }
    }

    /// Close the queue and wake every waiter
    pub fn close(&self) {
        let mut inner = lock(&self.inner);
        inner.closed = true;
        self.available.notify_all();
    }

    /// Drop all queued items
    pub fn clear(&self) {
        lock(&self.inner).items.clear();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wait_ready<R>(
        &self,
        timeout: Option<Duration>,
    ) -> Result<MutexGuard<'_, QueueInner<T>>, Wait<R>> {
        // A deadline past the end of the clock means no deadline
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut inner = lock(&self.inner);
        while inner.items.is_empty() && !inner.closed {
            inner = match deadline {
                None => self
                    .available
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Wait::TimedOut);
                    }
                    self.available
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        Ok(inner)
    }
}

impl<T: Copy> BlockingQueue<T> {
    /// Move up to `out.len()` items from the front into `out`, blocking until
    /// at least one is available.
    pub fn pop_into(&self, out: &mut [T], timeout: Option<Duration>) -> Wait<usize> {
        let mut inner = match self.wait_ready(timeout) {
            Ok(inner) => inner,
            Err(end) => return end,
        };
        if inner.items.is_empty() {
            return Wait::Closed;
        }
        let n = out.len().min(inner.items.len());
        for (slot, item) in out.iter_mut().zip(inner.items.drain(..n)) {
            *slot = item;
        }
        Wait::Ready(n)
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
