//! One-bit sticky signal with a FIFO wait list.
//!
//! The building block of [`Lock`](super::Lock) and [`Event`](super::Event).
//! While signaled, waiters pass straight through. Signaling wakes one or all
//! waiters; with `auto_clear`, a successful wake consumes the signal, which
//! hands it directly to the woken waiter.

use super::wait_queue::WaitQueue;
use crate::error::Error;

use std::cell::Cell;

pub(crate) struct StickySignal {
    state: Cell<bool>,
    queue: WaitQueue,
}

impl StickySignal {
    pub(crate) fn new(signaled: bool) -> Self {
        Self {
            state: Cell::new(signaled),
            queue: WaitQueue::new(),
        }
    }

    pub(crate) fn is_signaled(&self) -> bool {
        self.state.get()
    }

    pub(crate) fn clear(&self) {
        self.state.set(false);
    }

    /// Raises the signal and wakes one or all waiters.
    ///
    /// A no-op when already signaled. The signal stays clear when a waiter was
    /// woken with `auto_clear`; that waiter now owns it.
    pub(crate) fn signal(&self, wake_one: bool, auto_clear: bool) {
        if self.state.get() {
            return;
        }

        let woke = self.queue.wake(wake_one);
        self.state.set(!(woke && auto_clear));
    }

    /// Blocks until the signal is raised.
    pub(crate) fn wait(&self) -> Result<(), Error> {
        while !self.state.get() {
            self.queue.wait()?;
        }

        Ok(())
    }

    /// Blocks until the signal is handed over by an auto-clearing signal.
    ///
    /// `on_orphan` runs if the handoff reached this waiter but it was unwound
    /// before it could take ownership.
    pub(crate) fn wait_handoff<F>(&self, on_orphan: F) -> Result<(), Error>
    where
        F: FnOnce(),
    {
        self.queue.wait_with(on_orphan)
    }

    pub(crate) fn waiters(&self) -> usize {
        self.queue.len()
    }
}
