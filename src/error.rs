//! Error type shared by every fallible runtime operation.
//!
//! Structural misuse (an empty handle, a coroutine-only call made outside a
//! coroutine, awaiting oneself) is reported immediately by the call that
//! violated the precondition. Body panics and cancellation are captured in the
//! coroutine's result cell and replayed to whoever retrieves the result, which
//! is why the type is `Clone`.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The coroutine handle was never bound to a started coroutine.
    #[error("using uninitialized coroutine")]
    Uninitialized,

    /// A coroutine-only operation was invoked outside of any coroutine.
    #[error("no coroutine is running on this thread")]
    NoCoroutine,

    /// A coroutine tried to await its own result.
    #[error("a coroutine cannot await itself")]
    SelfAwait,

    /// The operation targets a coroutine other than the running one.
    #[error("coroutine `{0}` is not the running coroutine")]
    NotCurrent(String),

    #[error("coroutine has been canceled")]
    Canceled,

    /// The coroutine body panicked; the payload message is kept for the awaiter.
    #[error("coroutine `{coroutine}` panicked: {message}")]
    Panicked { coroutine: String, message: String },

    /// A typed handle was requested with a result type the coroutine does not produce.
    #[error("coroutine result type does not match the requested type")]
    ResultType,

    /// A completion handler was dropped before it was ever invoked.
    #[error("completion handler dropped without being invoked")]
    Abandoned,

    #[error("failed to allocate coroutine stack: {0}")]
    Stack(String),

    #[error("scheduler has live coroutines and cannot be reconfigured")]
    SchedulerBusy,

    #[error("scheduler was stopped with failure")]
    StoppedWithFailure,

    /// The scheduler was driven re-entrantly or from inside a coroutine.
    #[error("scheduler cannot be driven from inside a coroutine or re-entrantly")]
    NestedRun,

    #[error("i/o error: {0}")]
    Io(Arc<io::Error>),
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(Arc::new(error))
    }
}

impl Error {
    /// Returns the underlying I/O error kind, if this is an I/O failure.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Error::Io(error) => Some(error.kind()),
            _ => None,
        }
    }
}
