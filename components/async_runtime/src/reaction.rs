//! Reactions: the pending half of a `then`/`catch` registration.
//!
//! A [`Reaction`] pairs the callbacks given to `then` with the resolver of
//! the deferred `then` returned. When the source settles the reaction is
//! turned into exactly one microtask, which picks the callback matching the
//! outcome and settles the downstream deferred with whatever it produced.

use crate::event_loop::panic_message;
use crate::promise::{IntoResolution, Resolution, Resolver};
use core_types::{RejectionReason, TaskError};
use std::panic::{self, AssertUnwindSafe};

/// Type-erased reaction stored on a pending deferred.
pub(crate) type ReactionFn<T, E> = Box<dyn FnOnce(Result<T, E>)>;

type Callback<A, U, E> = Box<dyn FnOnce(A) -> Result<Resolution<U, E>, E>>;

/// What to do with a fulfillment value.
pub(crate) enum OnFulfilled<T, U, E> {
    /// Run a user callback.
    Call(Callback<T, U, E>),
    /// No callback was given: hand the value through unchanged.
    Forward(fn(T) -> U),
}

/// A pending `then` registration.
pub(crate) struct Reaction<T, U, E> {
    on_fulfilled: OnFulfilled<T, U, E>,
    on_rejected: Option<Callback<E, U, E>>,
    downstream: Resolver<U, E>,
}

impl<T, U, E> Reaction<T, U, E>
where
    T: Clone + 'static,
    U: Clone + 'static,
    E: RejectionReason,
{
    pub(crate) fn new(
        on_fulfilled: OnFulfilled<T, U, E>,
        on_rejected: Option<Callback<E, U, E>>,
        downstream: Resolver<U, E>,
    ) -> Self {
        Self {
            on_fulfilled,
            on_rejected,
            downstream,
        }
    }

    /// Runs the reaction against the settled outcome of its source.
    pub(crate) fn react(self, outcome: Result<T, E>) {
        let produced = match outcome {
            Ok(value) => match self.on_fulfilled {
                OnFulfilled::Call(callback) => invoke(move || callback(value)),
                OnFulfilled::Forward(forward) => Ok(Resolution::Value(forward(value))),
            },
            Err(reason) => match self.on_rejected {
                Some(callback) => invoke(move || callback(reason)),
                None => Err(reason),
            },
        };
        match produced {
            Ok(resolution) => self.downstream.resolve(resolution),
            Err(reason) => self.downstream.reject(reason),
        }
    }

    pub(crate) fn into_job(self) -> ReactionFn<T, E> {
        Box::new(move |outcome| self.react(outcome))
    }
}

/// Boxes a user callback, normalising its return into a [`Resolution`].
pub(crate) fn callback<A, R, U, E, F>(f: F) -> Callback<A, U, E>
where
    A: 'static,
    U: 'static,
    E: 'static,
    F: FnOnce(A) -> Result<R, E> + 'static,
    R: IntoResolution<U, E> + 'static,
{
    Box::new(move |arg| f(arg).map(<R as IntoResolution<U, E>>::into_resolution))
}

/// Calls a user callback, converting a panic into a rejection reason.
pub(crate) fn invoke<R, E, F>(f: F) -> Result<R, E>
where
    E: From<TaskError>,
    F: FnOnce() -> Result<R, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(E::from(TaskError::CallbackPanicked(panic_message(
            payload.as_ref(),
        )))),
    }
}
