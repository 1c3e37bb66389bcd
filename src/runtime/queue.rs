//! FIFO queue of posted callbacks.
//!
//! Everything that resumes a coroutine goes through this queue: wake-ups,
//! expired timers and I/O readiness. Callbacks run in the order they were
//! posted, which is the scheduling order of the runtime.

use crate::reactor::Callback;

use std::cell::RefCell;
use std::collections::VecDeque;

pub(crate) struct CallbackQueue {
    queue: RefCell<VecDeque<Callback>>,
}

impl CallbackQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
        }
    }

    /// Enqueues a callback at the back of the queue.
    pub(crate) fn push(&self, callback: Callback) {
        self.queue.borrow_mut().push_back(callback);
    }

    /// Dequeues the oldest callback.
    ///
    /// The borrow is released before returning, so the callback is free to
    /// post more work while it runs.
    pub(crate) fn pop(&self) -> Option<Callback> {
        self.queue.borrow_mut().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Drops every queued callback without running it.
    pub(crate) fn clear(&self) {
        let dropped = std::mem::take(&mut *self.queue.borrow_mut());
        drop(dropped);
    }
}
