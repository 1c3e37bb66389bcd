mod common;

use common::init_logging;
use coreactor::{
    Completion, Coroutine, Error, PendingGroup, bridge, initiate, scheduler, wait_for,
};
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn test_initiate_resumes_on_posted_completion() {
    init_logging();

    let main = Coroutine::start("main", |_| {
        let value = Rc::new(Cell::new(0));

        let v = value.clone();
        let op = initiate(
            move |n: u32| {
                v.set(n);
                n > 0
            },
            |bridge| scheduler::post(move || bridge.complete(7)),
        );

        let ok = op.wait().expect("wait");
        (ok, value.get())
    });

    scheduler::run().expect("run");

    assert_eq!(main.try_result().unwrap().unwrap(), (true, 7));
}

#[test]
fn test_unit_handler_counts_as_success() {
    init_logging();

    let main = Coroutine::start("main", |_| {
        initiate(|()| (), |bridge| scheduler::post(move || bridge.complete(())))
            .wait()
            .expect("wait")
    });

    scheduler::run().expect("run");

    assert!(main.try_result().unwrap().unwrap());
}

#[test]
fn test_result_handler_maps_errors_to_failure() {
    init_logging();

    let main = Coroutine::start("main", |_| {
        initiate(
            |code: i32| if code == 0 { Ok(()) } else { Err(code) },
            |bridge| scheduler::post(move || bridge.complete(5)),
        )
        .wait()
        .expect("wait")
    });

    scheduler::run().expect("run");

    assert!(!main.try_result().unwrap().unwrap());
}

#[test]
fn test_disconnected_completion_skips_handler() {
    init_logging();

    let invoked = Rc::new(Cell::new(false));

    let i = invoked.clone();
    let (completion, op) = bridge(move |_: ()| i.set(true));
    assert!(completion.is_connected());

    drop(op);
    assert!(!completion.is_connected());

    completion.complete(());
    assert!(!invoked.get(), "handler ran without anybody waiting");
}

#[test]
fn test_completion_before_wait_is_kept() {
    init_logging();

    let op = initiate(|ok: bool| ok, |bridge| bridge.complete(false));
    assert!(op.is_complete());
    assert!(!op.wait().expect("completed operations need no coroutine"));

    // Dropping the completion unused fails the operation right away.
    let op = initiate(|ok: bool| ok, |_bridge| {});
    assert!(op.is_complete());
    assert!(!op.wait().expect("wait"));
}

#[test]
fn test_wait_outside_coroutine_fails_while_running() {
    init_logging();

    let (completion, op) = bridge(|ok: bool| ok);
    assert!(matches!(op.wait(), Err(Error::NoCoroutine)));
    assert!(!completion.is_connected());
}

#[test]
fn test_dropped_completion_fails_the_wait() {
    init_logging();

    let main = Coroutine::start("main", |_| {
        initiate(|()| (), |bridge| scheduler::post(move || drop(bridge)))
            .wait()
            .expect("wait")
    });

    scheduler::run().expect("run");

    assert!(!main.try_result().unwrap().unwrap());
}

#[test]
fn test_group_fails_on_first_failure() {
    init_logging();

    let main = Coroutine::start("main", |_| {
        let (first, op1) = bridge(|ok: bool| ok);
        let (second, op2) = bridge(|ok: bool| ok);
        let (third, op3) = bridge(|ok: bool| ok);

        let mut group = PendingGroup::new();
        group += op1;
        group += op2;
        group += op3;

        scheduler::post(move || second.complete(false));

        let outcome = group.wait_all().expect("wait_all");
        let still_connected = first.is_connected() || third.is_connected();

        // Late completions after the group is gone are ignored.
        first.complete(true);
        third.complete(true);

        (outcome, still_connected)
    });

    scheduler::run().expect("run");

    assert_eq!(main.try_result().unwrap().unwrap(), (false, false));
}

#[test]
fn test_group_succeeds_when_all_succeed() {
    init_logging();

    let main = Coroutine::start("main", |_| {
        let mut group = PendingGroup::new();

        // Completed before joining.
        group += initiate(|ok: bool| ok, |bridge| bridge.complete(true));

        for _ in 0..3 {
            group += initiate(
                |ok: bool| ok,
                |bridge| scheduler::post(move || bridge.complete(true)),
            );
        }

        let len = group.len();
        (group.wait_all().expect("wait_all"), len)
    });

    scheduler::run().expect("run");

    assert_eq!(main.try_result().unwrap().unwrap(), (true, 4));
}

#[test]
fn test_group_any_returns_first_result() {
    init_logging();

    let main = Coroutine::start("main", |_| {
        let (slow, op1) = bridge(|ok: bool| ok);
        let (fast, op2) = bridge(|ok: bool| ok);

        let mut group = PendingGroup::new();
        group += op1;
        group += op2;

        scheduler::post(move || fast.complete(true));

        let outcome = group.wait_any().expect("wait_any");
        (outcome, slow.is_connected())
    });

    scheduler::run().expect("run");

    assert_eq!(main.try_result().unwrap().unwrap(), (true, false));
}

#[test]
fn test_empty_group() {
    assert!(PendingGroup::new().is_empty());
    assert!(PendingGroup::new().wait_all().expect("wait_all"));
    assert!(!PendingGroup::new().wait_any().expect("wait_any"));
}

#[test]
fn test_wait_for_returns_value() {
    init_logging();

    let main = Coroutine::start("main", |_| {
        wait_for(|completion: Completion<u32>| {
            scheduler::post(move || completion.complete(42));
        })
    });

    scheduler::run().expect("run");

    assert!(matches!(main.try_result(), Some(Ok(Ok(42)))));
}

#[test]
fn test_wait_for_abandoned() {
    init_logging();

    let main = Coroutine::start("main", |_| {
        wait_for(|completion: Completion<String>| {
            scheduler::post(move || drop(completion));
        })
    });

    scheduler::run().expect("run");

    assert!(matches!(main.try_result(), Some(Ok(Err(Error::Abandoned)))));
}

#[test]
fn test_wait_for_outside_coroutine() {
    let started = Cell::new(false);

    let result = wait_for(|_: Completion<u32>| started.set(true));

    assert!(matches!(result, Err(Error::NoCoroutine)));
    assert!(!started.get());
}
