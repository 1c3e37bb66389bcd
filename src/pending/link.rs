//! Sink/source links between pending operations and their completion handlers.
//!
//! Each link is a slot in a thread-local generational arena, addressed by a
//! [`Key`]. The sink side ([`PendingOperation`](super::PendingOperation) or a
//! group) and the source side ([`CompletionBridge`](super::CompletionBridge))
//! only hold the key, so either can disappear first: a completion whose sink is
//! gone finds a detached slot and does nothing, and a sink dropped after the
//! completion just frees the slot. The slot is released once both sides are
//! gone.
//!
//! No borrow of the arena is held while waking anybody; waking may run
//! arbitrary callbacks that touch the arena again.

use super::group::GroupState;
use crate::sync::WaitQueue;
use crate::utils::slab::{Key, Slab};

use log::warn;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

thread_local! {
    static LINKS: RefCell<Slab<Link>> = RefCell::new(Slab::new(64));
}

/// What the sink side currently expects from a completion.
enum Sink {
    /// The sink is gone; completions are ignored.
    Detached,
    /// Nobody is waiting yet.
    Idle,
    /// Completed before anybody waited.
    Completed(bool),
    /// A coroutine is parked on the queue.
    Waiting(Rc<WaitQueue>),
    /// Reports into a group.
    Grouped(Weak<GroupState>),
}

struct Link {
    source: bool,
    sink: Sink,
}

/// Where a delivered result has to go once the arena borrow is released.
enum Delivery {
    Nothing,
    Wake(Rc<WaitQueue>),
    Group(Weak<GroupState>),
}

/// Allocates a link with both sides attached.
pub(crate) fn open() -> Key {
    LINKS.with(|links| {
        links.borrow_mut().insert(Link {
            source: true,
            sink: Sink::Idle,
        })
    })
}

/// Returns whether a sink is still interested in the completion.
pub(crate) fn sink_attached(key: Key) -> bool {
    LINKS.with(|links| {
        links
            .borrow()
            .get(key)
            .is_some_and(|link| !matches!(link.sink, Sink::Detached))
    })
}

/// Delivers the completion result to the sink, exactly once per link.
///
/// Also detaches the source; the handler has been consumed.
pub(crate) fn deliver(key: Key, success: bool) {
    let delivery = LINKS
        .try_with(|links| {
            let mut links = links.borrow_mut();

            let Some(link) = links.get_mut(key) else {
                return Delivery::Nothing;
            };

            link.source = false;

            let delivery = match std::mem::replace(&mut link.sink, Sink::Detached) {
                Sink::Detached => Delivery::Nothing,
                Sink::Idle => {
                    link.sink = Sink::Completed(success);
                    Delivery::Nothing
                }
                Sink::Completed(previous) => {
                    link.sink = Sink::Completed(previous);
                    Delivery::Nothing
                }
                Sink::Waiting(queue) => {
                    link.sink = Sink::Completed(success);
                    Delivery::Wake(queue)
                }
                Sink::Grouped(group) => {
                    link.sink = Sink::Completed(success);
                    Delivery::Group(group)
                }
            };

            if matches!(link.sink, Sink::Detached) {
                links.remove(key);
            }

            delivery
        })
        .unwrap_or(Delivery::Nothing);

    match delivery {
        Delivery::Nothing => {}
        Delivery::Wake(queue) => {
            queue.wake(false);
        }
        Delivery::Group(group) => {
            if let Some(group) = group.upgrade() {
                group.report(success);
            }
        }
    }
}

/// Registers `queue` as the waiting party, unless a result is already there.
pub(crate) fn park(key: Key, queue: Rc<WaitQueue>) {
    LINKS.with(|links| {
        if let Some(link) = links.borrow_mut().get_mut(key) {
            if matches!(link.sink, Sink::Idle | Sink::Waiting(_)) {
                link.sink = Sink::Waiting(queue);
            }
        }
    });
}

/// Returns the delivered result, if the completion already happened.
pub(crate) fn take_completed(key: Key) -> Option<bool> {
    LINKS.with(|links| {
        let links = links.borrow();

        match links.get(key)?.sink {
            Sink::Completed(success) => Some(success),
            _ => None,
        }
    })
}

/// Redirects the sink into a group.
///
/// Returns the result already delivered, if any, so the group can count it.
pub(crate) fn join_group(key: Key, group: Weak<GroupState>) -> Option<bool> {
    LINKS.with(|links| {
        let mut links = links.borrow_mut();
        let link = links.get_mut(key)?;

        if let Sink::Completed(success) = link.sink {
            return Some(success);
        }

        link.sink = Sink::Grouped(group);
        None
    })
}

/// Drops the sink side; a later completion becomes a no-op.
pub(crate) fn detach_sink(key: Key) {
    let _ = LINKS.try_with(|links| {
        let mut links = links.borrow_mut();

        let free = match links.get_mut(key) {
            Some(link) => {
                link.sink = Sink::Detached;
                !link.source
            }
            None => false,
        };

        if free {
            links.remove(key);
        }
    });
}

/// Drops the source side without a completion.
///
/// A sink still waiting is failed rather than left parked forever.
pub(crate) fn detach_source(key: Key) {
    let attached = LINKS
        .try_with(|links| {
            links
                .borrow()
                .get(key)
                .is_some_and(|link| link.source && !matches!(link.sink, Sink::Detached))
        })
        .unwrap_or(false);

    if attached {
        warn!("completion handler dropped without being invoked");
        deliver(key, false);
        return;
    }

    let _ = LINKS.try_with(|links| {
        let mut links = links.borrow_mut();

        let free = match links.get_mut(key) {
            Some(link) => {
                link.source = false;
                matches!(link.sink, Sink::Detached)
            }
            None => false,
        };

        if free {
            links.remove(key);
        }
    });
}
