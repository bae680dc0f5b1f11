//! Unit tests for the timer helpers

use super::{entries, log};
use async_runtime::tools::{delay, reject_after, retry};
use async_runtime::{Deferred, DeferredState, EventLoop};
use core_types::{ErrorKind, JsError};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn delay_fulfills_after_the_given_time() {
    let event_loop = EventLoop::new();
    let later: Deferred<&str, JsError> = delay(&event_loop, 1_000, "tick");
    event_loop.run_until(999);
    assert!(later.is_pending());
    event_loop.run_until_idle();
    assert_eq!(later.state(), DeferredState::Fulfilled("tick"));
    assert_eq!(event_loop.now(), 1_000);
}

#[test]
fn reject_after_rejects_after_the_given_time() {
    let event_loop = EventLoop::new();
    let deadline: Deferred<(), JsError> =
        reject_after(&event_loop, 2_000, JsError::error("timed out"));
    let _handled = deadline.catch(|_| Ok(()));
    event_loop.run_until_idle();
    assert_eq!(
        deadline.state(),
        DeferredState::Rejected(JsError::error("timed out"))
    );
}

/// Rejects the first `failures` calls, then fulfills with the attempt number.
fn flaky(
    event_loop: &EventLoop,
    failures: usize,
    attempts: Rc<Cell<usize>>,
    times: Rc<RefCell<Vec<u64>>>,
) -> impl FnMut() -> Deferred<usize, JsError> {
    let event_loop = event_loop.clone();
    move || {
        let attempt = attempts.get() + 1;
        attempts.set(attempt);
        times.borrow_mut().push(event_loop.now());
        if attempt <= failures {
            reject_after(&event_loop, 100, JsError::error(format!("attempt {attempt} failed")))
        } else {
            delay(&event_loop, 100, attempt)
        }
    }
}

#[test]
fn retry_succeeds_after_failures() {
    let event_loop = EventLoop::new();
    let attempts = Rc::new(Cell::new(0));
    let times = Rc::new(RefCell::new(Vec::new()));
    let result = retry(
        &event_loop,
        4,
        flaky(&event_loop, 2, attempts.clone(), times.clone()),
    )
    .set_interval(300)
    .run();

    event_loop.run_until_idle();
    assert_eq!(result.state(), DeferredState::Fulfilled(3));
    assert_eq!(attempts.get(), 3);
    assert_eq!(*times.borrow(), vec![0, 400, 800]);
}

#[test]
fn retry_rejects_with_last_reason_when_exhausted() {
    let event_loop = EventLoop::new();
    let attempts = Rc::new(Cell::new(0));
    let times = Rc::new(RefCell::new(Vec::new()));
    let result = retry(
        &event_loop,
        3,
        flaky(&event_loop, 10, attempts.clone(), times.clone()),
    )
    .run();
    let _handled = result.catch(|_| Ok(0));

    event_loop.run_until_idle();
    assert_eq!(attempts.get(), 3);
    assert_eq!(
        result.state(),
        DeferredState::Rejected(JsError::error("attempt 3 failed"))
    );
}

#[test]
fn retry_with_exponential_backoff() {
    let event_loop = EventLoop::new();
    let attempts = Rc::new(Cell::new(0));
    let times = Rc::new(RefCell::new(Vec::new()));
    let result = retry(
        &event_loop,
        4,
        flaky(&event_loop, 3, attempts.clone(), times.clone()),
    )
    .set_interval(300)
    .exponential(true)
    .run();

    event_loop.run_until_idle();
    assert_eq!(result.state(), DeferredState::Fulfilled(4));
    // each attempt takes 100ms, then waits 300, 600, 1200
    assert_eq!(*times.borrow(), vec![0, 400, 1_100, 2_400]);
}

#[test]
fn zero_attempts_still_tries_once() {
    let event_loop = EventLoop::new();
    let log = log();
    let l = log.clone();
    let el = event_loop.clone();
    let result = retry(&event_loop, 0, move || {
        l.borrow_mut().push("attempt".to_string());
        Deferred::<i32, JsError>::resolved(&el, 1)
    })
    .run();
    event_loop.run_until_idle();
    assert_eq!(entries(&log), vec!["attempt"]);
    assert!(result.is_fulfilled());
}

#[test]
fn panicking_factory_rejects_instead_of_hanging() {
    let event_loop = EventLoop::new();
    let attempts = Rc::new(Cell::new(0));
    let a = attempts.clone();
    let el = event_loop.clone();
    let result = retry(&event_loop, 3, move || -> Deferred<i32, JsError> {
        a.set(a.get() + 1);
        if a.get() == 2 {
            panic!("factory blew up");
        }
        reject_after(&el, 10, JsError::error("not yet"))
    })
    .set_interval(50)
    .run();
    let _handled = result.catch(|_| Ok(0));

    let report = event_loop.run_until_idle();
    assert!(report.is_clean());
    assert_eq!(attempts.get(), 2);
    match result.state() {
        DeferredState::Rejected(error) => {
            assert_eq!(error.kind, ErrorKind::InternalError);
            assert!(error.message.contains("factory blew up"));
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[test]
fn panicking_first_attempt_does_not_escape_run() {
    let event_loop = EventLoop::new();
    let result = retry(&event_loop, 2, || -> Deferred<i32, JsError> {
        panic!("no first attempt")
    })
    .run();
    assert!(result.is_rejected());
    let _handled = result.catch(|_| Ok(0));
    event_loop.run_until_idle();
}
