//! Promise patterns built from Deferred, combinators and timer helpers

use async_runtime::combinators::{all, all_settled, any, race};
use async_runtime::tools::{delay, reject_after, retry};
use async_runtime::{Deferred, DeferredState, EventLoop, Outcome};
use core_types::{AggregateError, ErrorKind, JsError, UnhandledRejection};
use integration_tests::{drain, Console};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn sequential_chain_with_adopted_steps() {
    let el = EventLoop::new();
    let console = Console::new();

    let (l, c) = (el.clone(), console.clone());
    let user: Deferred<String, JsError> = delay::<u32, JsError>(&el, 100, 1).then(move |id| {
        c.log(format!("user {id} fetched"));
        Ok(delay::<String, JsError>(&l, 100, format!("user-{id}")))
    });
    let (l, c) = (el.clone(), console.clone());
    let posts: Deferred<Vec<String>, JsError> = user.then(move |name| {
        c.log(format!("fetching posts of {name}"));
        Ok(delay::<Vec<String>, JsError>(&l, 100, vec![format!("{name}/post-1"), format!("{name}/post-2")]))
    });
    let c = console.clone();
    let _ = posts.then(move |posts| {
        c.log(format!("{} posts", posts.len()));
        Ok(())
    });

    assert_eq!(
        drain(&el, &console),
        vec!["user 1 fetched", "fetching posts of user-1", "2 posts"]
    );
    assert_eq!(el.now(), 300);
}

#[test]
fn error_in_chain_skips_to_catch_then_finally() {
    let el = EventLoop::new();
    let console = Console::new();
    let (c1, c2, c3, c4) = (
        console.clone(),
        console.clone(),
        console.clone(),
        console.clone(),
    );

    let result = Deferred::<i32, JsError>::resolved(&el, 1)
        .then(move |x| -> Result<i32, JsError> {
            c1.log("step 1");
            Err(JsError::new(ErrorKind::RangeError, format!("{x} is too small")))
        })
        .then(move |x| {
            c2.log("step 2");
            Ok(x)
        })
        .catch(move |e| {
            c3.log(format!("caught {e}"));
            Ok(-1)
        })
        .finally(move || {
            c4.log("finally");
            Ok(())
        });

    assert_eq!(
        drain(&el, &console),
        vec!["step 1", "caught RangeError: 1 is too small", "finally"]
    );
    assert_eq!(result.state(), DeferredState::Fulfilled(-1));
}

#[test]
fn timeout_race_rejects_slow_operation() {
    let el = EventLoop::new();
    let slow = delay::<&str, JsError>(&el, 5_000, "done");
    let fast = delay::<&str, JsError>(&el, 1_000, "done");

    let timed_out = race(&el, vec![slow, reject_after(&el, 2_000, JsError::error("timeout"))]);
    let in_time = race(&el, vec![fast, reject_after(&el, 2_000, JsError::error("timeout"))]);
    let _handled = timed_out.catch(|_| Ok(""));

    el.run_until_idle();
    assert_eq!(timed_out.state(), DeferredState::Rejected(JsError::error("timeout")));
    assert_eq!(in_time.state(), DeferredState::Fulfilled("done"));
}

#[test]
fn parallel_requests_with_all() {
    let el = EventLoop::new();
    let started = el.now();
    let joined = all(
        &el,
        vec![
            delay::<&str, JsError>(&el, 300, "user"),
            delay(&el, 200, "posts"),
            delay(&el, 100, "comments"),
        ],
    );
    el.run_until_idle();
    assert_eq!(
        joined.state(),
        DeferredState::Fulfilled(vec!["user", "posts", "comments"])
    );
    // parallel, not 600ms
    assert_eq!(el.now() - started, 300);
}

#[test]
fn all_settled_and_any_report_mixed_results() {
    let el = EventLoop::new();
    let settled = all_settled(
        &el,
        vec![
            delay::<i32, JsError>(&el, 10, 1),
            reject_after(&el, 20, JsError::error("second failed")),
        ],
    );
    let first = any(
        &el,
        vec![
            reject_after::<i32, JsError>(&el, 5, JsError::error("a")),
            delay(&el, 15, 2),
        ],
    );
    let none = any(
        &el,
        vec![
            reject_after::<i32, JsError>(&el, 5, JsError::error("a")),
            reject_after(&el, 1, JsError::error("b")),
        ],
    );
    let _handled = none.catch(|_| Ok(0));

    el.run_until_idle();
    assert_eq!(
        settled.state(),
        DeferredState::Fulfilled(vec![
            Outcome::Fulfilled(1),
            Outcome::Rejected(JsError::error("second failed")),
        ])
    );
    assert_eq!(first.state(), DeferredState::Fulfilled(2));
    assert_eq!(
        none.state(),
        DeferredState::Rejected(AggregateError::new(vec![
            JsError::error("a"),
            JsError::error("b"),
        ]))
    );
}

#[test]
fn retry_until_success() {
    let el = EventLoop::new();
    let calls = Rc::new(Cell::new(0));

    let (l, n) = (el.clone(), calls.clone());
    let result = retry(&el, 5, move || {
        n.set(n.get() + 1);
        if n.get() < 3 {
            Deferred::rejected(&l, JsError::error("unstable"))
        } else {
            Deferred::resolved(&l, n.get())
        }
    })
    .set_interval(500)
    .run();

    el.run_until_idle();
    assert_eq!(result.state(), DeferredState::Fulfilled(3));
    assert_eq!(el.now(), 1_000);
}

#[test]
fn forgotten_rejection_reaches_hook() {
    let seen = Rc::new(RefCell::new(Vec::<UnhandledRejection>::new()));
    let s = seen.clone();
    let el = EventLoop::builder()
        .on_unhandled_rejection(move |rejection| s.borrow_mut().push(rejection.clone()))
        .build();

    let _ = delay::<i32, JsError>(&el, 10, 1).then(|_| Err::<i32, _>(JsError::error("oops")));
    let kept = Deferred::<i32, JsError>::rejected(&el, JsError::error("kept"));

    el.run_until_idle();
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].reason, "Error: oops");
    drop(kept);
}
