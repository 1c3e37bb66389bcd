//! Turning one-shot completion callbacks into coroutine suspension points.
//!
//! An asynchronous operation that reports its result through a callback is
//! started with a [`CompletionBridge`] as that callback. The matching
//! [`PendingOperation`] is what the coroutine blocks on: [`wait`] suspends
//! until the bridge is completed, then returns whether the result handler
//! reported success.
//!
//! ```ignore
//! let op = initiate(
//!     |(n, ok): (usize, bool)| { total.set(n); ok },
//!     |bridge| start_transfer(move |n, ok| bridge.complete((n, ok))),
//! );
//! let succeeded = op.wait()?;
//! ```
//!
//! [`wait`]: PendingOperation::wait

use super::link;
use crate::coroutine::Core;
use crate::error::Error;
use crate::sync::WaitQueue;
use crate::utils::slab::Key;

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// How a result handler's return value maps to success or failure.
pub trait IntoSuccess {
    fn into_success(self) -> bool;
}

impl IntoSuccess for () {
    fn into_success(self) -> bool {
        true
    }
}

impl IntoSuccess for bool {
    fn into_success(self) -> bool {
        self
    }
}

impl<T, E> IntoSuccess for Result<T, E> {
    fn into_success(self) -> bool {
        self.is_ok()
    }
}

/// The awaiting side of an asynchronous operation.
///
/// Dropping it disconnects the operation: a later completion is ignored and
/// its result handler is not run.
#[must_use = "dropping a pending operation discards its completion"]
pub struct PendingOperation {
    key: Key,
    disarm: Option<Box<dyn FnOnce()>>,
}

impl PendingOperation {
    pub(crate) fn key(&self) -> Key {
        self.key
    }

    /// Attaches a hook that withdraws the underlying operation (a timer, say)
    /// when this side is dropped.
    ///
    /// Runs after the sink is detached; the source dropping its completion
    /// in response is then a no-op.
    pub(crate) fn disarm_with<D>(mut self, disarm: D) -> Self
    where
        D: FnOnce() + 'static,
    {
        self.disarm = Some(Box::new(disarm));
        self
    }

    /// Whether the completion already arrived.
    pub fn is_complete(&self) -> bool {
        link::take_completed(self.key).is_some()
    }

    /// Blocks the calling coroutine until the operation completes.
    ///
    /// Returns what the result handler reported; `false` as well if the
    /// completion handler was dropped without being invoked. A completion that
    /// arrived before the call is returned immediately.
    ///
    /// # Errors
    /// [`Error::NoCoroutine`] when the operation is still running and the
    /// caller is not a coroutine.
    pub fn wait(self) -> Result<bool, Error> {
        if let Some(success) = link::take_completed(self.key) {
            return Ok(success);
        }

        if Core::current().is_none() {
            return Err(Error::NoCoroutine);
        }

        let queue = Rc::new(WaitQueue::new());
        link::park(self.key, queue.clone());

        loop {
            if let Some(success) = link::take_completed(self.key) {
                return Ok(success);
            }

            queue.wait()?;
        }
    }
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl Drop for PendingOperation {
    fn drop(&mut self) {
        link::detach_sink(self.key);

        if let Some(disarm) = self.disarm.take() {
            disarm();
        }
    }
}

/// The completing side of an asynchronous operation.
///
/// Wraps the result handler. [`complete`](Self::complete) runs it with the
/// operation's result and forwards its verdict to the waiting coroutine, but
/// only while someone is still waiting; otherwise nothing happens.
pub struct CompletionBridge<A, F> {
    key: Option<Key>,
    handler: Option<F>,
    _args: PhantomData<fn(A)>,
}

impl<A, F, R> CompletionBridge<A, F>
where
    F: FnOnce(A) -> R,
    R: IntoSuccess,
{
    /// Finishes the operation with `args`.
    pub fn complete(mut self, args: A) {
        let (Some(key), Some(handler)) = (self.key.take(), self.handler.take()) else {
            return;
        };

        if !link::sink_attached(key) {
            link::detach_source(key);
            return;
        }

        let success = handler(args).into_success();
        link::deliver(key, success);
    }
}

impl<A, F> CompletionBridge<A, F> {
    /// Whether a waiting party still cares about the completion.
    pub fn is_connected(&self) -> bool {
        self.key.is_some_and(link::sink_attached)
    }
}

impl<A, F> Drop for CompletionBridge<A, F> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            link::detach_source(key);
        }
    }
}

/// Completion handed out by [`wait_for`]: completing it with a value resumes
/// the waiting coroutine with that value.
pub type Completion<T> = CompletionBridge<T, Box<dyn FnOnce(T)>>;

/// Creates a connected bridge/operation pair around `handler`.
pub fn bridge<A, R, F>(handler: F) -> (CompletionBridge<A, F>, PendingOperation)
where
    F: FnOnce(A) -> R,
    R: IntoSuccess,
{
    let key = link::open();

    (
        CompletionBridge {
            key: Some(key),
            handler: Some(handler),
            _args: PhantomData,
        },
        PendingOperation { key, disarm: None },
    )
}

/// Starts an operation with a bridge wrapping `handler` and returns the
/// pending side.
///
/// `initiation` receives the bridge and is expected to arrange for it to be
/// completed exactly once. Completing it synchronously is fine.
pub fn initiate<A, R, F, I>(handler: F, initiation: I) -> PendingOperation
where
    F: FnOnce(A) -> R,
    R: IntoSuccess,
    I: FnOnce(CompletionBridge<A, F>),
{
    let (bridge, operation) = bridge(handler);
    initiation(bridge);
    operation
}

/// Starts an operation and blocks the calling coroutine until it completes
/// with a value.
///
/// # Errors
/// - [`Error::NoCoroutine`] when called outside of a coroutine; `initiation`
///   does not run in that case.
/// - [`Error::Abandoned`] if the completion is dropped without a value.
///
/// # Example
/// ```ignore
/// let answer: u32 = wait_for(|completion| {
///     scheduler::post(move || completion.complete(42));
/// })?;
/// ```
pub fn wait_for<T, I>(initiation: I) -> Result<T, Error>
where
    T: 'static,
    I: FnOnce(Completion<T>),
{
    if Core::current().is_none() {
        return Err(Error::NoCoroutine);
    }

    let slot = Rc::new(RefCell::new(None));
    let store = slot.clone();

    let handler: Box<dyn FnOnce(T)> = Box::new(move |value| {
        *store.borrow_mut() = Some(value);
    });

    let operation = initiate(handler, initiation);

    if !operation.wait()? {
        return Err(Error::Abandoned);
    }

    let value = slot.borrow_mut().take();
    value.ok_or(Error::Abandoned)
}
