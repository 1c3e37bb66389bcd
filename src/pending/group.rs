//! Waiting on several pending operations at once.

use super::link;
use super::op::PendingOperation;
use crate::error::Error;
use crate::sync::WaitQueue;

use std::cell::Cell;
use std::ops::AddAssign;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    All,
    Any,
}

/// Counters shared by every member of a group.
pub(crate) struct GroupState {
    total: Cell<usize>,
    completed: Cell<usize>,
    failed: Cell<bool>,
    first: Cell<Option<bool>>,
    mode: Cell<Mode>,
    queue: WaitQueue,
}

impl GroupState {
    /// Records one member's result and wakes the waiter once the outcome is decided.
    pub(crate) fn report(&self, success: bool) {
        self.completed.set(self.completed.get() + 1);

        if self.first.get().is_none() {
            self.first.set(Some(success));
        }

        let decided = match self.mode.get() {
            Mode::Idle => false,
            Mode::All => {
                let newly_failed = !success && !self.failed.get();
                newly_failed || self.completed.get() == self.total.get()
            }
            Mode::Any => true,
        };

        if !success {
            self.failed.set(true);
        }

        if decided {
            self.queue.wake(false);
        }
    }

    fn all_outcome(&self) -> Option<bool> {
        if self.failed.get() {
            Some(false)
        } else if self.completed.get() == self.total.get() {
            Some(true)
        } else {
            None
        }
    }
}

/// Group of pending operations awaited together.
///
/// Members report into one shared counter. Dropping the group, which
/// [`wait_all`](Self::wait_all) and [`wait_any`](Self::wait_any) do on
/// return, disconnects every member that has not completed.
///
/// # Example
/// ```ignore
/// let mut group = PendingGroup::new();
/// group += stream_a.writable();
/// group += stream_b.writable();
/// let all_ready = group.wait_all()?;
/// ```
pub struct PendingGroup {
    members: Vec<PendingOperation>,
    state: Rc<GroupState>,
}

impl Default for PendingGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingGroup {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            state: Rc::new(GroupState {
                total: Cell::new(0),
                completed: Cell::new(0),
                failed: Cell::new(false),
                first: Cell::new(None),
                mode: Cell::new(Mode::Idle),
                queue: WaitQueue::new(),
            }),
        }
    }

    /// Adds an operation to the group.
    ///
    /// An operation that already completed is counted right away.
    pub fn push(&mut self, operation: PendingOperation) {
        self.state.total.set(self.state.total.get() + 1);

        if let Some(success) = link::join_group(operation.key(), Rc::downgrade(&self.state)) {
            self.state.report(success);
        }

        self.members.push(operation);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Blocks until every member succeeded or any member failed.
    ///
    /// Returns `false` as soon as one member reports failure, without waiting
    /// for the rest. An empty group succeeds immediately.
    ///
    /// # Errors
    /// [`Error::NoCoroutine`] when it would block outside of a coroutine.
    pub fn wait_all(self) -> Result<bool, Error> {
        self.state.mode.set(Mode::All);

        loop {
            if let Some(outcome) = self.state.all_outcome() {
                return Ok(outcome);
            }

            self.state.queue.wait()?;
        }
    }

    /// Blocks until the first member completes and returns its result.
    ///
    /// An empty group returns `false` immediately.
    ///
    /// # Errors
    /// [`Error::NoCoroutine`] when it would block outside of a coroutine.
    pub fn wait_any(self) -> Result<bool, Error> {
        if self.members.is_empty() {
            return Ok(false);
        }

        self.state.mode.set(Mode::Any);

        loop {
            if let Some(first) = self.state.first.get() {
                return Ok(first);
            }

            self.state.queue.wait()?;
        }
    }
}

impl AddAssign<PendingOperation> for PendingGroup {
    fn add_assign(&mut self, operation: PendingOperation) {
        self.push(operation);
    }
}
