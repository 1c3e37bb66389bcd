//! Coroutine mutual exclusion.

use super::signaled::StickySignal;
use crate::error::Error;

use log::trace;

/// Binary lock for coroutines on one thread.
///
/// Blocked coroutines queue in FIFO order. Releasing the lock with waiters
/// queued hands it straight to the oldest one, so it is never observed free
/// in between.
///
/// # Example
/// ```ignore
/// let lock = Rc::new(Lock::new());
///
/// let l = lock.clone();
/// Coroutine::start("writer", move |_| {
///     let _guard = l.lock()?;
///     // exclusive section, may suspend
///     Ok::<_, Error>(())
/// });
/// ```
pub struct Lock {
    signal: StickySignal,
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock {
    /// Creates an unlocked lock.
    pub fn new() -> Self {
        Self {
            signal: StickySignal::new(true),
        }
    }

    /// Acquires the lock, suspending the calling coroutine while it is held.
    ///
    /// # Errors
    /// [`Error::NoCoroutine`] when the lock is held and the caller is not a
    /// coroutine.
    pub fn lock(&self) -> Result<LockGuard<'_>, Error> {
        if let Some(guard) = self.try_lock() {
            return Ok(guard);
        }

        trace!("lock contended, {} waiter(s) ahead", self.signal.waiters());

        self.signal.wait_handoff(|| self.release())?;

        Ok(LockGuard { lock: self })
    }

    /// Acquires the lock only if it is free right now.
    pub fn try_lock(&self) -> Option<LockGuard<'_>> {
        if !self.signal.is_signaled() {
            return None;
        }

        self.signal.clear();

        Some(LockGuard { lock: self })
    }

    pub fn is_locked(&self) -> bool {
        !self.signal.is_signaled()
    }

    fn release(&self) {
        self.signal.signal(true, true);
    }
}

/// Proof of lock ownership; releases the lock when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a Lock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
