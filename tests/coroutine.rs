mod common;

use common::{SetOnDrop, init_logging};
use coreactor::{Coroutine, CoroutineBuilder, Error, current, scheduler};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn test_await_returns_value() {
    init_logging();

    let worker = Coroutine::start("worker", |_| 6 * 7);
    let w = worker.clone();
    let main = Coroutine::start("main", move |_| w.await_result());

    scheduler::run().expect("run");

    assert!(matches!(main.try_result(), Some(Ok(Ok(42)))));
    assert!(!worker.running().unwrap());
}

#[test]
fn test_await_is_idempotent() {
    init_logging();

    let worker = Coroutine::start("worker", |_| String::from("done"));
    let w = worker.clone();
    let main = Coroutine::start("main", move |_| {
        let first = w.await_result().expect("first await");
        let second = w.await_result().expect("second await");
        (first, second)
    });

    scheduler::run().expect("run");

    let (first, second) = main.try_result().unwrap().unwrap();
    assert_eq!(first, "done");
    assert_eq!(second, "done");
    assert_eq!(worker.try_result().unwrap().unwrap(), "done");
    assert_eq!(worker.try_result().unwrap().unwrap(), "done");
}

#[test]
fn test_generator_values_arrive_in_order() {
    init_logging();

    let generator = Coroutine::start("generator", |me: Coroutine<Option<u32>>| {
        for i in 0..5 {
            me.yield_value(Some(i)).expect("yield");
        }
        None
    });

    let g = generator.clone();
    let consumer = Coroutine::start("consumer", move |_| {
        let mut seen = Vec::new();
        while let Some(value) = g.await_result().expect("await") {
            seen.push(value);
        }
        seen
    });

    scheduler::run().expect("run");

    assert_eq!(consumer.try_result().unwrap().unwrap(), vec![0, 1, 2, 3, 4]);
    assert!(!generator.running().unwrap());
}

#[test]
fn test_generator_driven_by_running_flag() {
    init_logging();

    let generator = Coroutine::start("counter", |me: Coroutine<u32>| {
        let mut i = 0;
        while i < 3 {
            me.yield_value(i).expect("yield");
            i += 1;
        }
        i
    });

    let g = generator.clone();
    let consumer = Coroutine::start("consumer", move |_| {
        let mut seen = Vec::new();
        while g.running().unwrap() {
            seen.push(g.await_result().expect("await"));
        }
        seen
    });

    scheduler::run().expect("run");

    assert_eq!(consumer.try_result().unwrap().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn test_panic_is_captured_and_replayed() {
    init_logging();

    let failing = Coroutine::<u32>::start("failing", |_| panic!("boom"));
    let f = failing.clone();
    let main = Coroutine::start("main", move |_| f.await_result());

    scheduler::run().expect("run");

    match main.try_result() {
        Some(Ok(Err(Error::Panicked { coroutine, message }))) => {
            assert_eq!(coroutine, "failing");
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(failing.try_result(), Some(Err(Error::Panicked { .. }))));
}

#[test]
fn test_self_await_is_rejected() {
    init_logging();

    let main = Coroutine::start("self", |me: Coroutine<bool>| {
        matches!(me.await_result(), Err(Error::SelfAwait))
    });

    scheduler::run().expect("run");

    assert!(main.try_result().unwrap().unwrap());
}

#[test]
fn test_await_outside_coroutine_fails() {
    init_logging();

    let worker = Coroutine::start("worker", |_| 1);
    assert!(matches!(worker.await_result(), Err(Error::NoCoroutine)));
    assert!(matches!(worker.yield_value(2), Err(Error::NoCoroutine)));

    scheduler::run().expect("run");
}

#[test]
fn test_uninitialized_handle() {
    let empty: Coroutine<u32> = Coroutine::default();

    assert!(matches!(empty.await_result(), Err(Error::Uninitialized)));
    assert!(matches!(empty.name(), Err(Error::Uninitialized)));
    assert!(matches!(empty.cancel(), Err(Error::Uninitialized)));
    assert!(matches!(empty.running(), Err(Error::Uninitialized)));
    assert!(empty.try_result().is_none());
}

#[test]
fn test_yield_on_other_coroutine_is_rejected() {
    init_logging();

    let idle = Coroutine::start("idle", |_| 0u32);
    let i = idle.clone();
    let main = Coroutine::start("main", move |_| {
        matches!(i.yield_value(1), Err(Error::NotCurrent(name)) if name == "idle")
    });

    scheduler::run().expect("run");

    assert!(main.try_result().unwrap().unwrap());
}

#[test]
fn test_reschedule_lets_others_run() {
    init_logging();

    let log = Rc::new(RefCell::new(Vec::new()));

    let l = log.clone();
    Coroutine::start("a", move |me: Coroutine| {
        l.borrow_mut().push("a1");
        me.reschedule().expect("reschedule");
        l.borrow_mut().push("a2");
    });

    let l = log.clone();
    Coroutine::start("b", move |_| l.borrow_mut().push("b1"));

    scheduler::run().expect("run");

    assert_eq!(*log.borrow(), vec!["a1", "b1", "a2"]);
}

#[test]
fn test_nested_start_and_await() {
    init_logging();

    let parent = Coroutine::start("parent", |_| {
        let child = Coroutine::start("child", |_| 21);
        child.await_result().map(|value| value * 2)
    });

    scheduler::run().expect("run");

    assert!(matches!(parent.try_result(), Some(Ok(Ok(42)))));
}

#[test]
fn test_cooperative_cancel() {
    init_logging();

    let worker = Coroutine::start("worker", |me: Coroutine<u32>| {
        let mut rounds = 0;
        while !me.canceled().unwrap() {
            me.reschedule().expect("reschedule");
            rounds += 1;
        }
        rounds
    });

    let w = worker.clone();
    let main = Coroutine::start("main", move |_| {
        w.cancel().expect("cancel");
        w.await_result()
    });

    scheduler::run().expect("run");

    assert!(matches!(main.try_result(), Some(Ok(Ok(1)))));
    assert!(worker.canceled().unwrap());
    assert!(!worker.cancel_throws().unwrap());
}

#[test]
fn test_throwing_cancel_unwinds_target() {
    init_logging();

    let unwound = Rc::new(Cell::new(false));

    let flag = unwound.clone();
    let worker = Coroutine::start("spinner", move |me: Coroutine| {
        let _guard = SetOnDrop(flag);
        loop {
            me.reschedule().expect("reschedule");
        }
    });

    let w = worker.clone();
    let main = Coroutine::start("main", move |_| {
        w.set_cancel_throws(true).expect("cancel_throws");
        w.cancel().expect("cancel");
        let first = w.await_result();
        let second = w.await_result();
        (first, second)
    });

    scheduler::run().expect("run");

    let (first, second) = main.try_result().unwrap().unwrap();
    assert!(matches!(first, Err(Error::Canceled)));
    assert!(matches!(second, Err(Error::Canceled)));
    assert!(unwound.get());
    assert!(!worker.running().unwrap());
}

#[test]
fn test_cancel_before_first_dispatch_skips_body() {
    init_logging();

    let ran = Rc::new(Cell::new(false));

    let r = ran.clone();
    let worker = Coroutine::start("unstarted", move |_| {
        r.set(true);
        9
    });
    worker.set_cancel_throws(true).expect("cancel_throws");
    worker.cancel().expect("cancel");

    let w = worker.clone();
    let main = Coroutine::start("main", move |_| w.await_result());

    scheduler::run().expect("run");

    assert!(!ran.get(), "body ran after being canceled");
    assert!(matches!(main.try_result(), Some(Ok(Err(Error::Canceled)))));
    assert!(!worker.running().unwrap());
}

#[test]
fn test_cancel_of_finished_coroutine_is_noop() {
    init_logging();

    let worker = Coroutine::start("worker", |_| 5);
    let w = worker.clone();
    let main = Coroutine::start("main", move |_| {
        let before = w.await_result().expect("await");
        w.set_cancel_throws(true).expect("cancel_throws");
        w.cancel().expect("cancel");
        let after = w.await_result().expect("await again");
        (before, after)
    });

    scheduler::run().expect("run");

    assert_eq!(main.try_result().unwrap().unwrap(), (5, 5));
    assert!(!worker.canceled().unwrap());
}

#[test]
fn test_self_cancel_unwinds_in_place() {
    init_logging();

    let reached = Rc::new(Cell::new(false));

    let r = reached.clone();
    let worker = Coroutine::start("quitter", move |me: Coroutine<u32>| {
        me.set_cancel_throws(true).expect("cancel_throws");
        me.cancel().expect("cancel");
        r.set(true);
        7
    });

    scheduler::run().expect("run");

    assert!(!reached.get());
    assert!(matches!(worker.try_result(), Some(Err(Error::Canceled))));
}

#[test]
fn test_current_accessors() {
    init_logging();

    assert!(!current::is_coroutine());
    assert!(matches!(current::name(), Err(Error::NoCoroutine)));

    struct RequestId(u64);

    let main = Coroutine::start("named", |_: Coroutine<u32>| {
        let name = current::name().expect("name");
        let typed = current::coroutine::<u32>().is_ok();
        let mistyped = matches!(current::coroutine::<String>(), Err(Error::ResultType));

        let previous = current::set_data(Rc::new(RequestId(7))).expect("set_data");
        let stored = current::data::<RequestId>()
            .expect("data")
            .map(|id| id.0);

        let fine = current::is_coroutine() && previous.is_none() && typed && mistyped;
        if fine && name == "named" && stored == Some(7) {
            1
        } else {
            0
        }
    });

    scheduler::run().expect("run");

    assert_eq!(main.try_result().unwrap().unwrap(), 1);
}

#[test]
fn test_builder_stack_size() {
    init_logging();

    let worker = CoroutineBuilder::new("small")
        .stack_size(64 * 1024)
        .spawn(|_| "ok")
        .expect("spawn");

    let oversized = CoroutineBuilder::new("oversized")
        .stack_size(usize::MAX)
        .spawn(|_| "never");

    scheduler::run().expect("run");

    assert_eq!(worker.try_result().unwrap().unwrap(), "ok");
    assert!(matches!(oversized, Err(Error::Stack(_))));
}
