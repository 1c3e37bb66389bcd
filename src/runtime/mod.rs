//! Runtime subsystem modules.

pub(crate) mod context;
pub(crate) mod queue;
pub mod scheduler;
