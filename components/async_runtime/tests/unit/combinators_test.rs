//! Unit tests for the combinators

use async_runtime::combinators::{all, all_settled, any, race};
use async_runtime::tools::{delay, reject_after};
use async_runtime::{Deferred, DeferredState, EventLoop, Outcome};
use core_types::AggregateError;

type D<T> = Deferred<T, String>;

#[test]
fn all_keeps_input_order_regardless_of_timing() {
    let event_loop = EventLoop::new();
    let inputs: Vec<D<&str>> = vec![
        delay(&event_loop, 300, "slow"),
        delay(&event_loop, 100, "fast"),
        delay(&event_loop, 200, "medium"),
    ];
    let joined = all(&event_loop, inputs);
    event_loop.run_until_idle();
    assert_eq!(
        joined.state(),
        DeferredState::Fulfilled(vec!["slow", "fast", "medium"])
    );
    assert_eq!(event_loop.now(), 300);
}

#[test]
fn all_rejects_with_first_rejection() {
    let event_loop = EventLoop::new();
    let inputs: Vec<D<i32>> = vec![
        Deferred::resolved(&event_loop, 1),
        Deferred::rejected(&event_loop, "boom".to_string()),
        Deferred::resolved(&event_loop, 3),
    ];
    let joined = all(&event_loop, inputs);
    let _handled = joined.catch(|_| Ok(Vec::new()));
    event_loop.run_until_idle();
    assert_eq!(joined.state(), DeferredState::Rejected("boom".to_string()));
}

#[test]
fn all_rejection_does_not_wait_for_slow_inputs() {
    let event_loop = EventLoop::new();
    let inputs: Vec<D<i32>> = vec![
        delay(&event_loop, 1_000, 1),
        reject_after(&event_loop, 10, "early failure".to_string()),
    ];
    let joined = all(&event_loop, inputs);
    let _handled = joined.catch(|_| Ok(Vec::new()));
    event_loop.run_until(10);
    assert_eq!(
        joined.state(),
        DeferredState::Rejected("early failure".to_string())
    );
}

#[test]
fn race_settles_with_earliest_by_time() {
    let event_loop = EventLoop::new();
    let inputs: Vec<D<&str>> = vec![
        delay(&event_loop, 300, "slow"),
        delay(&event_loop, 100, "fast"),
    ];
    let winner = race(&event_loop, inputs);
    event_loop.run_until_idle();
    assert_eq!(winner.state(), DeferredState::Fulfilled("fast"));
}

#[test]
fn race_can_be_won_by_a_rejection() {
    let event_loop = EventLoop::new();
    let inputs: Vec<D<&str>> = vec![
        delay(&event_loop, 5_000, "response"),
        reject_after(&event_loop, 2_000, "timeout: 2000ms".to_string()),
    ];
    let winner = race(&event_loop, inputs);
    let _handled = winner.catch(|_| Ok(""));
    event_loop.run_until_idle();
    assert_eq!(
        winner.state(),
        DeferredState::Rejected("timeout: 2000ms".to_string())
    );
}

#[test]
fn any_fulfills_with_first_fulfillment() {
    let event_loop = EventLoop::new();
    let inputs: Vec<D<i32>> = vec![
        reject_after(&event_loop, 10, "a".to_string()),
        delay(&event_loop, 50, 2),
        delay(&event_loop, 80, 3),
    ];
    let first = any(&event_loop, inputs);
    event_loop.run_until_idle();
    assert_eq!(first.state(), DeferredState::Fulfilled(2));
}

#[test]
fn any_aggregates_errors_in_input_order() {
    let event_loop = EventLoop::new();
    let inputs: Vec<D<i32>> = vec![
        reject_after(&event_loop, 30, "first".to_string()),
        reject_after(&event_loop, 10, "second".to_string()),
    ];
    let first = any(&event_loop, inputs);
    let _handled = first.catch(|_| Ok(0));
    event_loop.run_until_idle();
    assert_eq!(
        first.state(),
        DeferredState::Rejected(AggregateError::new(vec![
            "first".to_string(),
            "second".to_string()
        ]))
    );
}

#[test]
fn all_settled_reports_every_outcome() {
    let event_loop = EventLoop::new();
    let inputs: Vec<D<i32>> = vec![
        delay(&event_loop, 20, 1),
        reject_after(&event_loop, 10, "nope".to_string()),
        Deferred::resolved(&event_loop, 3),
    ];
    let settled = all_settled(&event_loop, inputs);
    event_loop.run_until_idle();
    assert_eq!(
        settled.state(),
        DeferredState::Fulfilled(vec![
            Outcome::Fulfilled(1),
            Outcome::Rejected("nope".to_string()),
            Outcome::Fulfilled(3),
        ])
    );
}

#[test]
fn all_settled_of_nothing_is_empty() {
    let event_loop = EventLoop::new();
    let settled = all_settled::<i32, String>(&event_loop, Vec::new());
    assert_eq!(settled.state(), DeferredState::Fulfilled(vec![]));
}
