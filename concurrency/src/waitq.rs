// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Blocking FIFO used for inbound socket delivery

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// An unbounded FIFO paired with the condition variable of its own lock.
///
/// [`push`] wakes one sleeper; [`pop_wait`] sleeps until an item arrives;
/// [`pop_wait_for`] sleeps with a deadline and reports a timeout as `None`.
///
/// [`push`]: WaitQueue::push
/// [`pop_wait`]: WaitQueue::pop_wait
/// [`pop_wait_for`]: WaitQueue::pop_wait_for
#[derive(Debug)]
pub struct WaitQueue<T> {
    queue: Mutex<VecDeque<T>>,
    wakeup: Condvar,
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        WaitQueue::new()
    }
}

impl<T> WaitQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> WaitQueue<T> {
        WaitQueue {
            queue: Mutex::new(VecDeque::new()),
            wakeup: Condvar::new(),
        }
    }

    /// Append `item` and wake one sleeper.
    pub fn push(&self, item: T) {
        self.queue.lock().push_back(item);
        self.wakeup.notify_one();
    }

    /// Pop the oldest item without blocking.
    #[must_use]
    pub fn try_pop(&self) -> Option<T> {
        self.queue.lock().pop_front()
    }

    /// Pop the oldest item, sleeping indefinitely until one arrives.
    #[must_use]
    pub fn pop_wait(&self) -> T {
        let mut queue = self.queue.lock();
        loop {
            if let Some(item) = queue.pop_front() {
                return item;
            }
            self.wakeup.wait(&mut queue);
        }
    }

    /// Pop the oldest item, sleeping at most `timeout`.
    ///
    /// Returns `None` if the deadline passes with the queue still empty.
    #[must_use]
    pub fn pop_wait_for(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        loop {
            if let Some(item) = queue.pop_front() {
                return Some(item);
            }
            if self.wakeup.wait_until(&mut queue, deadline).timed_out() {
                return queue.pop_front();
            }
        }
    }

    /// The number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True iff no items are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
