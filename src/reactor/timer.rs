//! Deadline-ordered timer queue.
//!
//! Timers are kept in a min-heap keyed by `(deadline, id)`, so timers sharing
//! a deadline fire in insertion order. Cancellation removes the callback from
//! the side table and leaves a tombstone in the heap that is skipped lazily.

use super::Callback;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

/// Identifier returned by [`TimerQueue::insert`], used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TimerId(u64);

pub(crate) struct TimerQueue {
    deadlines: BinaryHeap<Reverse<(Instant, u64)>>,
    callbacks: HashMap<u64, Callback>,
    next_id: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self {
            deadlines: BinaryHeap::new(),
            callbacks: HashMap::new(),
            next_id: 0,
        }
    }

    /// Registers `callback` to fire once `deadline` has passed.
    pub(crate) fn insert(&mut self, deadline: Instant, callback: Callback) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;

        self.deadlines.push(Reverse((deadline, id)));
        self.callbacks.insert(id, callback);

        TimerId(id)
    }

    /// Removes a timer before it fires and hands its callback back.
    pub(crate) fn cancel(&mut self, id: TimerId) -> Option<Callback> {
        self.callbacks.remove(&id.0)
    }

    /// Removes and returns every callback whose deadline is at or before `now`,
    /// in firing order.
    pub(crate) fn expire(&mut self, now: Instant) -> Vec<Callback> {
        let mut expired = Vec::new();

        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            if deadline > now {
                break;
            }

            self.deadlines.pop();

            if let Some(callback) = self.callbacks.remove(&id) {
                expired.push(callback);
            }
        }

        expired
    }

    /// Returns the earliest live deadline, discarding canceled tombstones.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            if self.callbacks.contains_key(&id) {
                return Some(deadline);
            }
            self.deadlines.pop();
        }

        None
    }

    /// Time left until the next deadline, zero if it already passed.
    pub(crate) fn next_remaining(&mut self, now: Instant) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Drops every pending timer and returns the callbacks so the caller can
    /// release them outside of any borrow.
    pub(crate) fn clear(&mut self) -> Vec<Callback> {
        self.deadlines.clear();
        self.callbacks.drain().map(|(_, callback)| callback).collect()
    }
}
