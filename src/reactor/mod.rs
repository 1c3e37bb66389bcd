//! Event reactor backing the scheduler: posted callbacks, timers, socket
//! readiness and OS signals.

pub(crate) mod core;
pub(crate) mod signal;
pub(crate) mod timer;

/// Unit of work queued on the reactor.
pub(crate) type Callback = Box<dyn FnOnce()>;
