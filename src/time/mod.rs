//! Timer-driven waits.
//!
//! - [`sleep`] suspends the calling coroutine for a duration.
//! - [`timer`] arms a reactor timer and returns it as a [`PendingOperation`],
//!   so it can be waited on directly or combined with other operations in a
//!   [`PendingGroup`](crate::PendingGroup).
//!
//! There is no built-in timeout; a deadline is composed from a timer and
//! [`Coroutine::cancel`](crate::Coroutine::cancel).
//!
//! # Example
//!
//! ```ignore
//! use coreactor::time::{sleep, timer};
//! use std::time::Duration;
//!
//! Coroutine::start("ticker", |_| {
//!     sleep(Duration::from_millis(10))?;
//!     let fired = timer(Duration::from_millis(5), |_at| ()).wait()?;
//!     Ok::<_, Error>(fired)
//! });
//! ```

mod sleep;

pub use sleep::{sleep, timer};
