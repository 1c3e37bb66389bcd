//! Single-threaded event reactor.
//!
//! The reactor multiplexes three sources of work, all of which end up as
//! callbacks in one FIFO queue:
//!
//! - callbacks posted directly (coroutine wake-ups, user work),
//! - timers whose deadline has passed,
//! - readiness events reported by the `mio` poller for registered sockets.
//!
//! Readiness is edge-triggered. An edge that arrives while nobody is waiting
//! for that direction is remembered on the source and replayed as soon as a
//! waiter registers, so a wake-up is never lost between a `WouldBlock` and the
//! registration of the waiter.

use super::Callback;
use super::timer::{TimerId, TimerQueue};
use crate::runtime::queue::CallbackQueue;
use crate::utils::slab::{Key, Slab};

use log::trace;
use mio::event::Source;
use mio::{Events, Interest, Poll, Token};
use std::cell::RefCell;
use std::io;
use std::time::{Duration, Instant};

/// Readiness direction a waiter is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Read,
    Write,
}

/// Handle to a socket registered with the reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IoKey(Key);

#[derive(Default)]
struct IoSource {
    read: Option<Callback>,
    write: Option<Callback>,
    read_ready: bool,
    write_ready: bool,
}

impl IoSource {
    fn waiter(&mut self, direction: Direction) -> (&mut Option<Callback>, &mut bool) {
        match direction {
            Direction::Read => (&mut self.read, &mut self.read_ready),
            Direction::Write => (&mut self.write, &mut self.write_ready),
        }
    }
}

pub(crate) struct Reactor {
    posted: CallbackQueue,
    timers: RefCell<TimerQueue>,
    poll: RefCell<Option<Poll>>,
    events: RefCell<Events>,
    sources: RefCell<Slab<IoSource>>,
}

impl Reactor {
    pub(crate) fn new(event_capacity: usize) -> Self {
        Self {
            posted: CallbackQueue::new(),
            timers: RefCell::new(TimerQueue::new()),
            poll: RefCell::new(None),
            events: RefCell::new(Events::with_capacity(event_capacity)),
            sources: RefCell::new(Slab::new(16)),
        }
    }

    /// Schedules `callback` to run after everything already posted.
    pub(crate) fn post(&self, callback: Callback) {
        self.posted.push(callback);
    }

    pub(crate) fn pop_posted(&self) -> Option<Callback> {
        self.posted.pop()
    }

    pub(crate) fn posted_len(&self) -> usize {
        self.posted.len()
    }

    pub(crate) fn add_timer(&self, deadline: Instant, callback: Callback) -> TimerId {
        self.timers.borrow_mut().insert(deadline, callback)
    }

    pub(crate) fn cancel_timer(&self, id: TimerId) {
        let callback = self.timers.borrow_mut().cancel(id);
        drop(callback);
    }

    /// Moves every expired timer callback onto the posted queue.
    pub(crate) fn fire_timers(&self, now: Instant) {
        let expired = self.timers.borrow_mut().expire(now);

        for callback in expired {
            self.posted.push(callback);
        }
    }

    /// Returns how long the next poll may block, bounded by `limit`.
    ///
    /// Zero when posted work is already waiting.
    pub(crate) fn poll_timeout(&self, limit: Duration) -> Duration {
        if !self.posted.is_empty() {
            return Duration::ZERO;
        }

        match self.timers.borrow_mut().next_remaining(Instant::now()) {
            Some(remaining) => remaining.min(limit),
            None => limit,
        }
    }

    /// Returns whether any posted callback, timer or readiness waiter is left.
    pub(crate) fn has_work(&self) -> bool {
        !self.posted.is_empty() || !self.timers.borrow().is_empty() || self.has_io_waiters()
    }

    fn has_io_waiters(&self) -> bool {
        self.sources
            .borrow()
            .iter()
            .any(|source| source.read.is_some() || source.write.is_some())
    }

    /// Registers a socket for both readiness directions.
    pub(crate) fn register<S: Source>(&self, source: &mut S) -> io::Result<IoKey> {
        self.ensure_poll()?;

        let key = self.sources.borrow_mut().insert(IoSource::default());

        let registered = match self.poll.borrow().as_ref() {
            Some(poll) => poll.registry().register(
                source,
                Token(key.index()),
                Interest::READABLE | Interest::WRITABLE,
            ),
            None => Err(io::Error::other("poller is not initialized")),
        };

        if let Err(error) = registered {
            let removed = self.sources.borrow_mut().remove(key);
            drop(removed);
            return Err(error);
        }

        trace!("registered socket as token {}", key.index());

        Ok(IoKey(key))
    }

    /// Removes a socket from the poller, dropping any waiting callbacks.
    pub(crate) fn deregister<S: Source>(&self, key: IoKey, source: &mut S) {
        if let Some(poll) = self.poll.borrow().as_ref() {
            if let Err(error) = poll.registry().deregister(source) {
                trace!("deregistering token {} failed: {error}", key.0.index());
            }
        }

        let removed = self.sources.borrow_mut().remove(key.0);
        drop(removed);
    }

    /// Arranges for `callback` to be posted once the socket is ready in `direction`.
    ///
    /// A readiness edge already recorded for that direction is consumed and the
    /// callback is posted right away. An older waiter for the same direction is
    /// replaced.
    pub(crate) fn when_ready(&self, key: IoKey, direction: Direction, callback: Callback) {
        let (replaced, ready_now) = {
            let mut sources = self.sources.borrow_mut();

            match sources.get_mut(key.0) {
                Some(source) => {
                    let (waiter, ready) = source.waiter(direction);

                    if *ready {
                        *ready = false;
                        (None, Some(callback))
                    } else {
                        (waiter.replace(callback), None)
                    }
                }
                // The socket is gone; dropping the callback reports abandonment.
                None => (Some(callback), None),
            }
        };

        drop(replaced);

        if let Some(callback) = ready_now {
            self.posted.push(callback);
        }
    }

    /// Waits up to `timeout` for readiness events and posts the matching callbacks.
    ///
    /// An interrupted wait is not an error; the caller simply loops.
    pub(crate) fn poll_io(&self, timeout: Duration) -> io::Result<()> {
        self.ensure_poll()?;

        let ready: Vec<(usize, bool, bool)> = {
            let mut poll = self.poll.borrow_mut();
            let mut events = self.events.borrow_mut();

            let Some(poll) = poll.as_mut() else {
                return Ok(());
            };

            match poll.poll(&mut events, Some(timeout)) {
                Ok(()) => {}
                Err(error) if error.kind() == io::ErrorKind::Interrupted => return Ok(()),
                Err(error) => return Err(error),
            }

            events
                .iter()
                .map(|event| {
                    let failed = event.is_error();
                    (
                        event.token().0,
                        event.is_readable() || event.is_read_closed() || failed,
                        event.is_writable() || event.is_write_closed() || failed,
                    )
                })
                .collect()
        };

        for (index, readable, writable) in ready {
            let mut woken = Vec::new();

            {
                let mut sources = self.sources.borrow_mut();
                let Some(source) = sources.get_by_index_mut(index) else {
                    continue;
                };

                for (direction, hit) in [(Direction::Read, readable), (Direction::Write, writable)]
                {
                    if !hit {
                        continue;
                    }

                    let (waiter, ready) = source.waiter(direction);
                    match waiter.take() {
                        Some(callback) => woken.push(callback),
                        None => *ready = true,
                    }
                }
            }

            trace!("token {index} ready, {} waiter(s) woken", woken.len());

            for callback in woken {
                self.posted.push(callback);
            }
        }

        Ok(())
    }

    /// Drops all posted callbacks, timers and readiness waiters.
    ///
    /// Sockets stay registered; only the callbacks waiting on them go.
    pub(crate) fn clear(&self) {
        self.posted.clear();

        let timers = self.timers.borrow_mut().clear();
        drop(timers);

        let waiters: Vec<Callback> = self
            .sources
            .borrow_mut()
            .iter_mut()
            .flat_map(|source| [source.read.take(), source.write.take()])
            .flatten()
            .collect();
        drop(waiters);
    }

    fn ensure_poll(&self) -> io::Result<()> {
        let mut poll = self.poll.borrow_mut();

        if poll.is_none() {
            *poll = Some(Poll::new()?);
        }

        Ok(())
    }
}
