//! Coroutine blocking primitives: the FIFO [`WaitQueue`] and the [`Lock`] and
//! [`Event`] built on a sticky signal.

mod event;
mod lock;
mod signaled;
mod wait_queue;

pub use event::Event;
pub use lock::{Lock, LockGuard};
pub use wait_queue::WaitQueue;
