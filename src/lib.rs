//! Single-threaded runtime for stackful coroutines.
//!
//! Coroutines run on their own machine stacks and switch cooperatively on one
//! thread. Code inside a coroutine reads sequentially (await another
//! coroutine, take a lock, wait for a socket) while a reactor interleaves
//! everything underneath.
//!
//! # Architecture
//!
//! - **Coroutine**: handle to a stackful coroutine with a typed result;
//!   start, await, yield, reschedule, cancel.
//! - **ExecutionContext**: owns one stack and performs the switches; forced
//!   unwinding implements throwing cancellation.
//! - **Scheduler**: per-thread owner of the reactor; resumes coroutines by
//!   posting callbacks and cancels every survivor on shutdown.
//! - **WaitQueue / Lock / Event**: FIFO blocking primitives.
//! - **PendingOperation / CompletionBridge / PendingGroup**: adapt one-shot
//!   completion callbacks into coroutine waits.
//! - **time / net**: timers and TCP sockets built on the above.
//!
//! # Example
//!
//! ```ignore
//! use coreactor::{Coroutine, scheduler};
//!
//! let producer = Coroutine::start("producer", |me: Coroutine<Option<u32>>| {
//!     for i in 0..3 {
//!         me.yield_value(Some(i)).ok();
//!     }
//!     None
//! });
//!
//! Coroutine::start("consumer", move |_| {
//!     while let Ok(Some(value)) = producer.await_result() {
//!         println!("got {value}");
//!     }
//! });
//!
//! scheduler::run()?;
//! ```

mod builder;
mod coroutine;
mod error;
mod pending;
mod reactor;
mod runtime;
mod sync;
mod utils;

pub mod current;
pub mod net;
pub mod time;

pub use builder::SchedulerBuilder;
pub use coroutine::{Coroutine, CoroutineBuilder};
pub use error::{Error, Result};
pub use pending::{
    Completion, CompletionBridge, IntoSuccess, PendingGroup, PendingOperation, bridge, initiate,
    wait_for,
};
pub use runtime::scheduler;
pub use sync::{Event, Lock, LockGuard, WaitQueue};
