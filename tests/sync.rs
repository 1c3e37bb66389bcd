mod common;

use common::init_logging;
use coreactor::{Coroutine, Error, Event, Lock, WaitQueue, scheduler};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn test_lock_is_exclusive_and_fifo() {
    init_logging();

    let lock = Rc::new(Lock::new());
    let log = Rc::new(RefCell::new(Vec::new()));
    let holders = Rc::new(Cell::new(0));
    let most = Rc::new(Cell::new(0));

    for name in ["w1", "w2", "w3"] {
        let lock = lock.clone();
        let log = log.clone();
        let holders = holders.clone();
        let most = most.clone();

        Coroutine::start(name, move |me: Coroutine| {
            let _guard = lock.lock().expect("lock");

            holders.set(holders.get() + 1);
            most.set(most.get().max(holders.get()));
            log.borrow_mut().push(name);

            me.reschedule().expect("reschedule");
            me.reschedule().expect("reschedule");

            holders.set(holders.get() - 1);
        });
    }

    scheduler::run().expect("run");

    assert_eq!(*log.borrow(), vec!["w1", "w2", "w3"]);
    assert_eq!(most.get(), 1, "two coroutines held the lock at once");
    assert!(!lock.is_locked());
}

#[test]
fn test_release_hands_lock_to_waiter() {
    init_logging();

    let lock = Rc::new(Lock::new());
    let acquired = Rc::new(Cell::new(false));

    let l = lock.clone();
    let a = acquired.clone();
    let holder = Coroutine::start("holder", move |me: Coroutine<(bool, bool)>| {
        let guard = l.lock().expect("lock");

        let waiter_lock = l.clone();
        Coroutine::start("waiter", move |_| {
            let _guard = waiter_lock.lock().expect("waiter lock");
            a.set(true);
        });

        me.reschedule().expect("reschedule");
        drop(guard);

        (l.try_lock().is_none(), l.is_locked())
    });

    scheduler::run().expect("run");

    assert_eq!(holder.try_result().unwrap().unwrap(), (true, true));
    assert!(acquired.get());
    assert!(!lock.is_locked());
}

#[test]
fn test_try_lock_and_uncontended_lock_outside_coroutine() {
    let lock = Lock::new();

    let guard = lock.lock().expect("free lock needs no coroutine");
    assert!(lock.is_locked());
    assert!(lock.try_lock().is_none());
    assert!(matches!(lock.lock(), Err(Error::NoCoroutine)));

    drop(guard);
    assert!(!lock.is_locked());
    assert!(lock.try_lock().is_some());
}

#[test]
fn test_canceled_waiter_leaves_the_queue() {
    init_logging();

    let lock = Rc::new(Lock::new());

    let l = lock.clone();
    let holder = Coroutine::start("holder", move |me: Coroutine<(bool, bool)>| {
        let guard = l.lock().expect("lock");

        let waiter_lock = l.clone();
        let waiter = Coroutine::start("waiter", move |_| {
            let _guard = waiter_lock.lock().expect("waiter lock");
        });

        me.reschedule().expect("reschedule");

        waiter.set_cancel_throws(true).expect("cancel_throws");
        waiter.cancel().expect("cancel");
        me.reschedule().expect("reschedule");

        drop(guard);

        let free = !l.is_locked();
        let canceled = matches!(waiter.await_result(), Err(Error::Canceled));
        (free, canceled)
    });

    scheduler::run().expect("run");

    assert_eq!(holder.try_result().unwrap().unwrap(), (true, true));
    assert!(!lock.is_locked());
}

#[test]
fn test_orphaned_handoff_passes_to_next_waiter() {
    init_logging();

    let lock = Rc::new(Lock::new());
    let log = Rc::new(RefCell::new(Vec::new()));

    let l = lock.clone();
    let lg = log.clone();
    Coroutine::start("holder", move |me: Coroutine| {
        let guard = l.lock().expect("lock");

        let mut waiters = Vec::new();
        for name in ["first", "second"] {
            let lock = l.clone();
            let log = lg.clone();
            waiters.push(Coroutine::start(name, move |_| {
                let _guard = lock.lock().expect("waiter lock");
                log.borrow_mut().push(name);
            }));
        }

        me.reschedule().expect("reschedule");

        // The lock now belongs to `first`, which dies before it can run.
        drop(guard);
        waiters[0].set_cancel_throws(true).expect("cancel_throws");
        waiters[0].cancel().expect("cancel");
    });

    scheduler::run().expect("run");

    assert_eq!(*log.borrow(), vec!["second"]);
    assert!(!lock.is_locked(), "lock was lost with the canceled waiter");
}

#[test]
fn test_event_releases_all_waiters() {
    init_logging();

    let event = Rc::new(Event::new());
    let log = Rc::new(RefCell::new(Vec::new()));

    assert!(matches!(event.wait(), Err(Error::NoCoroutine)));

    for name in ["w1", "w2"] {
        let event = event.clone();
        let log = log.clone();
        Coroutine::start(name, move |_| {
            event.wait().expect("wait");
            log.borrow_mut().push(name);
        });
    }

    let e = event.clone();
    let l = log.clone();
    Coroutine::start("setter", move |_| {
        l.borrow_mut().push("set");
        e.set();
        e.set();
    });

    scheduler::run().expect("run");

    assert_eq!(*log.borrow(), vec!["set", "w1", "w2"]);
    assert!(event.is_set());
    event.wait().expect("a set event lets anyone through");
}

#[test]
fn test_wait_queue_wake_one_then_all() {
    init_logging();

    let queue = Rc::new(WaitQueue::new());
    let log = Rc::new(RefCell::new(Vec::new()));

    for name in ["a", "b", "c"] {
        let queue = queue.clone();
        let log = log.clone();
        Coroutine::start(name, move |_| {
            queue.wait().expect("wait");
            log.borrow_mut().push(name);
        });
    }

    let q = queue.clone();
    let driver = Coroutine::start("driver", move |me: Coroutine<(bool, usize, bool)>| {
        let woke_first = q.wake(true);
        me.reschedule().expect("reschedule");

        let left = q.len();
        let woke_rest = q.wake(false);
        (woke_first, left, woke_rest)
    });

    scheduler::run().expect("run");

    assert_eq!(driver.try_result().unwrap().unwrap(), (true, 2, true));
    assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    assert!(queue.is_empty());
    assert!(!queue.wake(true), "an empty queue has nobody to wake");
}

#[test]
fn test_wait_queue_outside_coroutine() {
    let queue = WaitQueue::new();

    assert!(matches!(queue.wait(), Err(Error::NoCoroutine)));
    assert!(queue.is_empty());
}
