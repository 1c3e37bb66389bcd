//! Bridging external completion callbacks into coroutine waits.

mod group;
mod link;
mod op;

pub use group::PendingGroup;
pub use op::{
    Completion, CompletionBridge, IntoSuccess, PendingOperation, bridge, initiate, wait_for,
};
