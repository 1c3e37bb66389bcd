//! Fluent builder for scheduler configuration.
//!
//! Every thread owns one scheduler, created with default settings on first
//! use. [`SchedulerBuilder`] replaces it with a configured instance before any
//! coroutine is started.

use std::time::Duration;

use crate::error::Error;
use crate::runtime::scheduler;

const DEFAULT_STACK_SIZE: usize = 256 * 1024;
const DEFAULT_EVENT_CAPACITY: usize = 256;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settings shared by the scheduler, its reactor and newly created stacks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Config {
    /// Stack size used by coroutines that do not override it.
    pub(crate) stack_size: usize,

    /// Number of readiness events fetched per poll.
    pub(crate) event_capacity: usize,

    /// Upper bound on how long a single poll may block.
    pub(crate) poll_interval: Duration,

    /// Install SIGINT/SIGHUP handlers when the scheduler starts running.
    pub(crate) signal_handlers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            signal_handlers: false,
        }
    }
}

/// Builder for the calling thread's scheduler.
///
/// # Example
/// ```ignore
/// SchedulerBuilder::new()
///     .stack_size(128 * 1024)
///     .signal_handlers(true)
///     .install()?;
/// ```
#[derive(Debug, Clone)]
pub struct SchedulerBuilder {
    config: Config,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Sets the default coroutine stack size in bytes.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = size;
        self
    }

    /// Sets how many readiness events a single poll can return.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    /// Caps how long the scheduler sleeps in the poller when no timer is due.
    ///
    /// Signal-driven stop requests are observed at least this often.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Installs SIGINT/SIGHUP handlers that stop the scheduler on `run()`.
    pub fn signal_handlers(mut self, enabled: bool) -> Self {
        self.config.signal_handlers = enabled;
        self
    }

    /// Replaces the calling thread's scheduler with one using this configuration.
    ///
    /// # Returns
    /// [`Error::SchedulerBusy`] if the current scheduler is running or still
    /// owns live coroutines.
    pub fn install(self) -> Result<(), Error> {
        scheduler::install(self.config)
    }
}
