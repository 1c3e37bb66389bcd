//! Per-thread coroutine scheduler.
//!
//! The scheduler owns the thread's [`Reactor`] and a registry of every live
//! coroutine, kept in creation order. It is created lazily on first use and
//! lives in thread-local storage, so the free functions of this module act on
//! the calling thread's instance.
//!
//! Resuming a coroutine never switches stacks directly: [`resume`] posts a
//! dispatch callback, and the dispatch re-checks the coroutine's state before
//! switching in, since it may have been canceled or resumed by someone else in
//! the meantime. When control comes back and the coroutine is done, its stack
//! is reclaimed.
//!
//! # Example
//!
//! ```ignore
//! use coreactor::{Coroutine, scheduler};
//!
//! let worker = Coroutine::start("worker", |_| 42);
//! scheduler::run()?;
//! assert_eq!(worker.try_result(), Some(Ok(42)));
//! ```

use crate::builder::Config;
use crate::coroutine::{CoroId, Core, State};
use crate::error::Error;
use crate::reactor::Callback;
use crate::reactor::core::Reactor;
use crate::reactor::signal;
use crate::reactor::timer::TimerId;

pub use crate::reactor::signal::setup_signal_handlers;

use log::{debug, trace, warn};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::time::Instant;

thread_local! {
    static SCHEDULER: RefCell<Option<Rc<Scheduler>>> = const { RefCell::new(None) };

    // Outlives scheduler replacement, so ids are never reused on a thread.
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
}

pub(crate) struct Scheduler {
    pub(crate) reactor: Reactor,
    registry: RefCell<BTreeMap<CoroId, Weak<Core>>>,
    config: Config,
    stopped: Cell<bool>,
    failed: Cell<bool>,
    running: Cell<bool>,
}

impl Scheduler {
    fn new(config: Config) -> Self {
        Self {
            reactor: Reactor::new(config.event_capacity),
            registry: RefCell::new(BTreeMap::new()),
            config,
            stopped: Cell::new(false),
            failed: Cell::new(false),
            running: Cell::new(false),
        }
    }

    fn live_coroutines(&self) -> Vec<Rc<Core>> {
        self.registry
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .filter(|core| core.state() != State::Done)
            .collect()
    }

    /// Runs callbacks, timers and I/O until stopped or out of work.
    fn drive(&self) -> Result<(), Error> {
        loop {
            if signal::take_stop_request() {
                debug!("stop requested by signal");
                self.stopped.set(true);
            }

            if self.stopped.get() {
                break;
            }

            // Only the callbacks present now; anything they post waits for the
            // next round so timers and I/O are not starved.
            let batch = self.reactor.posted_len();
            for _ in 0..batch {
                if self.stopped.get() {
                    break;
                }

                match self.reactor.pop_posted() {
                    Some(callback) => callback(),
                    None => break,
                }
            }

            if self.stopped.get() {
                break;
            }

            self.reactor.fire_timers(Instant::now());

            if !self.reactor.has_work() {
                trace!("scheduler idle");
                break;
            }

            let timeout = self.reactor.poll_timeout(self.config.poll_interval);
            self.reactor.poll_io(timeout)?;
        }

        Ok(())
    }

    /// Runs posted callbacks until none are left, ignoring the stop flag.
    fn drain(&self) {
        while let Some(callback) = self.reactor.pop_posted() {
            callback();
        }
    }

    /// Cancels every live coroutine, with throwing semantics and in creation
    /// order, until all stacks have unwound.
    fn cancel_all(&self) {
        loop {
            let victims = self.live_coroutines();
            if victims.is_empty() {
                break;
            }

            debug!("shutdown: canceling {} coroutine(s)", victims.len());

            for core in &victims {
                core.set_cancel_throws(true);
                core.cancel();
            }

            self.drain();

            let unwound = victims
                .iter()
                .filter(|core| core.state() == State::Done)
                .count();

            if unwound == 0 {
                warn!(
                    "shutdown: {} coroutine(s) did not unwind",
                    victims.len()
                );
                break;
            }
        }

        self.reactor.clear();
        self.stopped.set(false);
    }
}

/// Returns the calling thread's scheduler, creating it on first use.
pub(crate) fn handle() -> Rc<Scheduler> {
    SCHEDULER.with(|scheduler| {
        scheduler
            .borrow_mut()
            .get_or_insert_with(|| Rc::new(Scheduler::new(Config::default())))
            .clone()
    })
}

/// Returns the calling thread's scheduler if it exists and thread-local
/// storage is still alive.
pub(crate) fn try_handle() -> Option<Rc<Scheduler>> {
    SCHEDULER
        .try_with(|scheduler| scheduler.borrow().clone())
        .ok()
        .flatten()
}

pub(crate) fn install(config: Config) -> Result<(), Error> {
    if let Some(current) = try_handle() {
        if current.running.get() || !current.live_coroutines().is_empty() {
            return Err(Error::SchedulerBusy);
        }
    }

    let replaced = SCHEDULER.with(|scheduler| {
        scheduler
            .borrow_mut()
            .replace(Rc::new(Scheduler::new(config)))
    });
    drop(replaced);

    debug!("installed scheduler: {config:?}");

    Ok(())
}

pub(crate) fn config() -> Config {
    handle().config
}

pub(crate) fn allocate_id() -> CoroId {
    let id = NEXT_ID.with(|next| next.replace(next.get() + 1));
    CoroId(id)
}

/// Adds a coroutine to the shutdown registry.
pub(crate) fn register(core: &Rc<Core>) {
    handle()
        .registry
        .borrow_mut()
        .insert(core.id(), Rc::downgrade(core));
}

/// Removes `core` from the registry, leaving entries of other coroutines alone.
pub(crate) fn unregister(id: CoroId, core: *const Core) {
    let Some(scheduler) = try_handle() else {
        return;
    };

    if let Ok(mut registry) = scheduler.registry.try_borrow_mut() {
        let owned = registry
            .get(&id)
            .is_some_and(|entry| std::ptr::eq(entry.as_ptr(), core));

        if owned {
            registry.remove(&id);
        }
    }
}

/// Finds a live coroutine by id.
pub(crate) fn lookup(id: CoroId) -> Option<Rc<Core>> {
    let scheduler = try_handle()?;
    let registry = scheduler.registry.borrow();

    registry.get(&id).and_then(Weak::upgrade)
}

/// Schedules a suspended coroutine to run.
///
/// Coroutines in any other state are left alone.
pub(crate) fn resume(core: &Rc<Core>) {
    if core.state() != State::Suspended {
        return;
    }

    core.set_state(State::Pending);

    let core = core.clone();
    post_callback(Box::new(move || dispatch(core)));
}

fn dispatch(core: Rc<Core>) {
    if core.state() != State::Pending {
        return;
    }

    let Some(context) = core.context() else {
        return;
    };

    core.set_state(State::Running);
    trace!("switching into coroutine `{}`", core.name());
    context.resume();

    if core.state() == State::Done {
        if let Some(context) = core.take_context() {
            context.destroy();
        }
    }
}

pub(crate) fn post_callback(callback: Callback) {
    handle().reactor.post(callback);
}

pub(crate) fn add_timer(deadline: Instant, callback: Callback) -> TimerId {
    handle().reactor.add_timer(deadline, callback)
}

pub(crate) fn cancel_timer(id: TimerId) {
    if let Some(scheduler) = try_handle() {
        scheduler.reactor.cancel_timer(id);
    }
}

/// Queues `callback` to run on the scheduler thread after all work posted before it.
pub fn post<F>(callback: F)
where
    F: FnOnce() + 'static,
{
    post_callback(Box::new(callback));
}

/// Drives the calling thread's scheduler until it is stopped or runs out of work.
///
/// Posted callbacks run in FIFO order, followed by expired timers and socket
/// readiness. When the loop ends, every coroutine still alive is canceled and
/// unwound (see [`shutdown`]).
///
/// # Returns
/// - `Err(Error::NestedRun)` when called from a coroutine or re-entrantly.
/// - `Err(Error::StoppedWithFailure)` when [`stop`] was called with `failure`.
/// - Any I/O error reported by the poller.
pub fn run() -> Result<(), Error> {
    if Core::current().is_some() {
        return Err(Error::NestedRun);
    }

    let scheduler = handle();
    if scheduler.running.replace(true) {
        return Err(Error::NestedRun);
    }

    if scheduler.config.signal_handlers {
        if let Err(error) = setup_signal_handlers() {
            scheduler.running.set(false);
            return Err(error);
        }
    }

    debug!("scheduler running");

    let result = scheduler.drive();
    scheduler.cancel_all();
    scheduler.running.set(false);

    debug!("scheduler stopped");

    result?;

    if scheduler.failed.replace(false) {
        return Err(Error::StoppedWithFailure);
    }

    Ok(())
}

/// Asks the running scheduler to stop after the current callback.
///
/// With `failure`, the pending [`run`] call reports [`Error::StoppedWithFailure`].
pub fn stop(failure: bool) {
    let scheduler = handle();
    scheduler.stopped.set(true);

    if failure {
        scheduler.failed.set(true);
    }

    debug!("scheduler stop requested (failure: {failure})");
}

/// Cancels every live coroutine and drops all pending callbacks and timers.
///
/// Cancellation is forced: each coroutine gets `cancel_throws` set before it is
/// canceled, so every stack unwinds. Must be called from outside of any
/// coroutine.
pub fn shutdown() -> Result<(), Error> {
    if Core::current().is_some() {
        return Err(Error::NestedRun);
    }

    handle().cancel_all();

    Ok(())
}
