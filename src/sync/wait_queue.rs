//! FIFO queue of suspended coroutines.
//!
//! Every blocking primitive in the crate parks coroutines here. A waiter is
//! woken by being removed from the queue; a coroutine resumed for any other
//! reason finds itself still queued and suspends again, so spurious
//! resumptions are harmless.
//!
//! The queue entry belongs to the `wait` call that created it: if the waiting
//! coroutine is unwound (canceled) while queued, the entry is removed on the
//! way out and never woken.

use crate::coroutine::{CoroId, Core};
use crate::error::Error;
use crate::runtime::scheduler;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

struct Entry {
    ticket: u64,
    coroutine: CoroId,
}

/// FIFO wait list; insertion order is wake order.
///
/// # Example
/// ```ignore
/// let queue = Rc::new(WaitQueue::new());
///
/// let q = queue.clone();
/// Coroutine::start("sleeper", move |_| q.wait());
///
/// // later, from anywhere on the scheduler thread
/// queue.wake(true);
/// ```
#[derive(Default)]
pub struct WaitQueue {
    waiters: RefCell<VecDeque<Entry>>,
    next_ticket: Cell<u64>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks the calling coroutine at the tail of the queue until it is woken.
    ///
    /// # Errors
    /// [`Error::NoCoroutine`] when called outside of a coroutine.
    pub fn wait(&self) -> Result<(), Error> {
        self.wait_with(|| {})
    }

    /// Like [`wait`](Self::wait), but runs `on_orphan` if the coroutine is
    /// unwound after being woken and before it got to run.
    ///
    /// Lets primitives that hand ownership to the woken waiter pass it on
    /// instead of losing it.
    pub(crate) fn wait_with<F>(&self, on_orphan: F) -> Result<(), Error>
    where
        F: FnOnce(),
    {
        let current = Core::current().ok_or(Error::NoCoroutine)?;

        let ticket = self.next_ticket.get();
        self.next_ticket.set(ticket + 1);

        self.waiters.borrow_mut().push_back(Entry {
            ticket,
            coroutine: current.id(),
        });

        let mut waiter = Waiter {
            queue: self,
            ticket,
            on_orphan: Some(on_orphan),
            completed: false,
        };

        while waiter.is_linked() {
            current.suspend();
        }

        waiter.completed = true;

        Ok(())
    }

    /// Wakes the oldest waiter, or every waiter when `wake_one` is false.
    ///
    /// Woken coroutines are scheduled, not run. Returns whether anything was woken.
    pub fn wake(&self, wake_one: bool) -> bool {
        let mut woke = false;

        loop {
            let entry = self.waiters.borrow_mut().pop_front();
            let Some(entry) = entry else {
                break;
            };

            let Some(core) = scheduler::lookup(entry.coroutine) else {
                continue;
            };

            scheduler::resume(&core);
            woke = true;

            if wake_one {
                break;
            }
        }

        woke
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.waiters.borrow().len()
    }

    fn contains(&self, ticket: u64) -> bool {
        self.waiters
            .borrow()
            .iter()
            .any(|entry| entry.ticket == ticket)
    }

    fn unlink(&self, ticket: u64) -> bool {
        let mut waiters = self.waiters.borrow_mut();

        match waiters.iter().position(|entry| entry.ticket == ticket) {
            Some(position) => {
                waiters.remove(position);
                true
            }
            None => false,
        }
    }
}

/// Queue membership of one `wait` call.
struct Waiter<'a, F: FnOnce()> {
    queue: &'a WaitQueue,
    ticket: u64,
    on_orphan: Option<F>,
    completed: bool,
}

impl<F: FnOnce()> Waiter<'_, F> {
    fn is_linked(&self) -> bool {
        self.queue.contains(self.ticket)
    }
}

impl<F: FnOnce()> Drop for Waiter<'_, F> {
    fn drop(&mut self) {
        if self.queue.unlink(self.ticket) || self.completed {
            return;
        }

        // Woken, then unwound before running.
        if let Some(on_orphan) = self.on_orphan.take() {
            on_orphan();
        }
    }
}
