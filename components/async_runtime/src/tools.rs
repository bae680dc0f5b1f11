//! Timer-backed helpers built from the public scheduling API.
//!
//! Nothing here touches loop internals: each helper only combines
//! [`EventLoop::set_timeout`] with a [`Deferred`] and its [`Resolver`].
//! User factories run under the same panic guard as `then` callbacks.

use crate::event_loop::EventLoop;
use crate::promise::{Deferred, Resolver};
use crate::reaction::invoke;
use core_types::RejectionReason;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

/// A deferred fulfilled with `value` after `ms` milliseconds.
pub fn delay<T, E>(event_loop: &EventLoop, ms: u64, value: T) -> Deferred<T, E>
where
    T: Clone + 'static,
    E: RejectionReason,
{
    let (deferred, resolver) = Deferred::new(event_loop);
    event_loop.set_timeout(
        move || {
            resolver.resolve(value);
            Ok(())
        },
        ms,
    );
    deferred
}

/// A deferred rejected with `reason` after `ms` milliseconds.
///
/// Race it against an operation to put a deadline on it:
///
/// ```
/// use async_runtime::{combinators, tools, DeferredState, EventLoop};
/// use core_types::JsError;
///
/// let el = EventLoop::new();
/// let slow = tools::delay(&el, 5_000, "done");
/// let deadline = tools::reject_after(&el, 2_000, JsError::error("timed out"));
/// let guarded = combinators::race(&el, vec![slow, deadline]);
///
/// el.run_until_idle();
/// assert_eq!(guarded.state(), DeferredState::Rejected(JsError::error("timed out")));
/// # let _ = guarded.catch(|_| Ok(""));
/// ```
pub fn reject_after<T, E>(event_loop: &EventLoop, ms: u64, reason: E) -> Deferred<T, E>
where
    T: Clone + 'static,
    E: RejectionReason,
{
    let (deferred, resolver) = Deferred::<T, E>::new(event_loop);
    event_loop.set_timeout(
        move || {
            resolver.reject(reason);
            Ok(())
        },
        ms,
    );
    deferred
}

/// Creates a [`Retry`] that calls `factory` up to `attempts` times.
///
/// # Arguments
///
/// * `event_loop` - The loop the waits between attempts are scheduled on.
/// * `attempts` - Total number of attempts; zero is treated as one.
/// * `factory` - Starts one attempt and returns its deferred.
pub fn retry<T, E, G>(event_loop: &EventLoop, attempts: usize, factory: G) -> Retry<G>
where
    T: Clone + 'static,
    E: RejectionReason,
    G: FnMut() -> Deferred<T, E> + 'static,
{
    Retry {
        event_loop: event_loop.clone(),
        factory,
        attempts: attempts.max(1),
        interval: 0,
        exponential: false,
    }
}

/// Re-runs an operation after each rejection.
///
/// Rejects with the last reason once every attempt has failed.
pub struct Retry<G> {
    event_loop: EventLoop,
    factory: G,
    attempts: usize,
    interval: u64,
    exponential: bool,
}

impl<G> Retry<G> {
    /// Sets the wait, in milliseconds, before each new attempt.
    pub fn set_interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    /// Doubles the wait after every failed attempt.
    pub fn exponential(mut self, exponential: bool) -> Self {
        self.exponential = exponential;
        self
    }

    /// Wait before attempt `next` (1-based, so the first retry is 2).
    fn wait_before(&self, next: usize) -> u64 {
        if !self.exponential {
            return self.interval;
        }
        let doublings = u32::try_from(next.saturating_sub(2)).unwrap_or(u32::MAX);
        self.interval
            .saturating_mul(2u64.checked_pow(doublings).unwrap_or(u64::MAX))
    }

    /// Starts the first attempt and returns the overall result.
    pub fn run<T, E>(self) -> Deferred<T, E>
    where
        T: Clone + 'static,
        E: RejectionReason,
        G: FnMut() -> Deferred<T, E> + 'static,
    {
        let (result, resolver) = Deferred::new(&self.event_loop);
        let state = Rc::new(RetryState {
            retry: RefCell::new(self),
        });
        attempt(state, 1, resolver);
        result
    }
}

struct RetryState<G> {
    retry: RefCell<Retry<G>>,
}

fn attempt<T, E, G>(state: Rc<RetryState<G>>, number: usize, resolver: Resolver<T, E>)
where
    T: Clone + 'static,
    E: RejectionReason,
    G: FnMut() -> Deferred<T, E> + 'static,
{
    let operation = {
        let mut retry = state.retry.borrow_mut();
        debug!(attempt = number, of = retry.attempts, "retry attempt");
        invoke(|| Ok::<_, E>((retry.factory)()))
    };
    let operation = match operation {
        Ok(operation) => operation,
        Err(reason) => {
            warn!(attempt = number, %reason, "retry factory panicked");
            resolver.reject(reason);
            return;
        }
    };
    let on_value = resolver.clone();
    let _: Deferred<(), E> = operation.then_or_else(
        move |value| {
            on_value.resolve(value);
            Ok(())
        },
        move |reason| {
            let (attempts, wait, event_loop) = {
                let retry = state.retry.borrow();
                (retry.attempts, retry.wait_before(number + 1), retry.event_loop.clone())
            };
            if number >= attempts {
                debug!(attempts, %reason, "retry exhausted");
                resolver.reject(reason);
                return Ok(());
            }
            debug!(attempt = number, wait, %reason, "attempt failed, retrying");
            event_loop.set_timeout(
                move || {
                    attempt(state, number + 1, resolver);
                    Ok(())
                },
                wait,
            );
            Ok(())
        },
    );
}
