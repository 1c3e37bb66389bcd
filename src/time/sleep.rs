use crate::coroutine::Core;
use crate::error::Error;
use crate::pending::{IntoSuccess, PendingOperation, bridge};
use crate::runtime::scheduler;

use std::time::{Duration, Instant};

/// Suspends the calling coroutine for at least `duration`.
///
/// A zero duration returns immediately without suspending.
///
/// # Errors
/// [`Error::NoCoroutine`] when called outside of a coroutine with a non-zero
/// duration.
pub fn sleep(duration: Duration) -> Result<(), Error> {
    if duration.is_zero() {
        return Ok(());
    }

    if Core::current().is_none() {
        return Err(Error::NoCoroutine);
    }

    // Unwinding out of the wait drops the operation, which disarms the timer.
    if timer(duration, |_fired| ()).wait()? {
        Ok(())
    } else {
        Err(Error::Abandoned)
    }
}

/// Arms a timer that completes after `duration`.
///
/// `handler` receives the instant the timer fired; its return value decides
/// whether the operation succeeded (see [`IntoSuccess`]). Dropping the
/// returned operation cancels the timer.
pub fn timer<R, F>(duration: Duration, handler: F) -> PendingOperation
where
    F: FnOnce(Instant) -> R + 'static,
    R: IntoSuccess + 'static,
{
    let (completion, operation) = bridge(handler);

    let id = scheduler::add_timer(
        Instant::now() + duration,
        Box::new(move || completion.complete(Instant::now())),
    );

    operation.disarm_with(move || scheduler::cancel_timer(id))
}
