//! One-shot latch.

use super::signaled::StickySignal;
use crate::error::Error;

/// Latch that, once set, lets every present and future waiter through.
///
/// There is no reset.
pub struct Event {
    signal: StickySignal,
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    pub fn new() -> Self {
        Self {
            signal: StickySignal::new(false),
        }
    }

    /// Sets the event and wakes every waiter. Setting it again does nothing.
    pub fn set(&self) {
        self.signal.signal(false, false);
    }

    pub fn is_set(&self) -> bool {
        self.signal.is_signaled()
    }

    /// Blocks the calling coroutine until the event is set.
    ///
    /// Returns immediately, even outside of a coroutine, once it is set.
    pub fn wait(&self) -> Result<(), Error> {
        self.signal.wait()
    }
}
