//! Access to the coroutine running on this thread.
//!
//! These functions are the ambient counterpart of the handle a coroutine body
//! receives: code deep in a call stack can reach its coroutine without the
//! handle being threaded through.
//!
//! Each coroutine also carries a set of local slots keyed by type, for state
//! that should follow the coroutine rather than the thread.
//!
//! # Example
//!
//! ```ignore
//! use coreactor::current;
//!
//! struct RequestId(u64);
//!
//! current::set_data(Rc::new(RequestId(7)))?;
//! // ... further down the call stack
//! let id = current::data::<RequestId>()?;
//! ```

use crate::coroutine::{Core, Coroutine};
use crate::error::Error;

use std::any::Any;
use std::rc::Rc;

fn core() -> Result<Rc<Core>, Error> {
    Core::current().ok_or(Error::NoCoroutine)
}

/// Whether the caller runs inside a coroutine.
pub fn is_coroutine() -> bool {
    Core::current().is_some()
}

/// Returns a typed handle to the running coroutine.
///
/// # Errors
/// - [`Error::NoCoroutine`] outside of a coroutine.
/// - [`Error::ResultType`] when the coroutine does not produce `R`.
pub fn coroutine<R: 'static>() -> Result<Coroutine<R>, Error> {
    Coroutine::from_core(core()?)
}

/// Name of the running coroutine.
pub fn name() -> Result<String, Error> {
    Ok(core()?.name().to_string())
}

/// Cancels the running coroutine.
///
/// With `cancel_throws` set this unwinds the caller and does not return.
pub fn cancel() -> Result<(), Error> {
    core()?.cancel();
    Ok(())
}

/// Whether the running coroutine has been canceled.
pub fn canceled() -> Result<bool, Error> {
    Ok(core()?.canceled())
}

/// Lets every piece of work posted so far run, then continues.
pub fn reschedule() -> Result<(), Error> {
    core()?.reschedule();
    Ok(())
}

/// Returns the running coroutine's local value of type `D`, if set.
pub fn data<D: Any>() -> Result<Option<Rc<D>>, Error> {
    Ok(core()?.data::<D>())
}

/// Stores a local value of type `D` on the running coroutine.
///
/// # Returns
/// The value previously stored for `D`, if any.
pub fn set_data<D: Any>(value: Rc<D>) -> Result<Option<Rc<D>>, Error> {
    Ok(core()?.set_data(value))
}
