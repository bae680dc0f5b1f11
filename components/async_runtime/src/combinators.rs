//! Combinators over several deferreds.
//!
//! Every combinator is built on [`Deferred::then_or_else`] and a fresh
//! [`Resolver`], so results arrive in the same microtask order a
//! hand-written chain would produce.

use crate::event_loop::EventLoop;
use crate::promise::{Deferred, Resolver};
use core_types::{AggregateError, RejectionReason};
use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::Rc;
use tracing::trace;

/// How a single input of [`all_settled`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T, E> {
    /// The input fulfilled with this value.
    Fulfilled(T),
    /// The input rejected with this reason.
    Rejected(E),
}

impl<T, E> Outcome<T, E> {
    /// Returns true for [`Outcome::Fulfilled`].
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled(_))
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Fulfilled(value),
            Err(reason) => Outcome::Rejected(reason),
        }
    }
}

/// Per-input results gathered in input order.
struct Slots<V> {
    values: RefCell<Vec<Option<V>>>,
    remaining: Cell<usize>,
}

impl<V> Slots<V> {
    fn new(len: usize) -> Rc<Self> {
        Rc::new(Self {
            values: RefCell::new((0..len).map(|_| None).collect()),
            remaining: Cell::new(len),
        })
    }

    /// Stores `value` at `index`; returns every value once all slots are
    /// filled.
    fn fill(&self, index: usize, value: V) -> Option<Vec<V>> {
        self.values.borrow_mut()[index] = Some(value);
        let remaining = self.remaining.get() - 1;
        self.remaining.set(remaining);
        if remaining > 0 {
            return None;
        }
        let values = mem::take(&mut *self.values.borrow_mut());
        Some(values.into_iter().flatten().collect())
    }
}

/// Registers both handlers on `input`, discarding the derived deferred.
fn observe<T, E, F, G>(input: &Deferred<T, E>, on_fulfilled: F, on_rejected: G)
where
    T: Clone + 'static,
    E: RejectionReason,
    F: FnOnce(T) + 'static,
    G: FnOnce(E) + 'static,
{
    let _: Deferred<(), E> = input.then_or_else(
        move |value| {
            on_fulfilled(value);
            Ok(())
        },
        move |reason| {
            on_rejected(reason);
            Ok(())
        },
    );
}

/// Fulfills with every value, in input order, once all inputs fulfill.
///
/// Rejects with the first rejection to settle; later outcomes are ignored.
/// An empty input fulfills with an empty vector.
///
/// # Examples
///
/// ```
/// use async_runtime::{combinators, Deferred, DeferredState, EventLoop};
/// use core_types::JsError;
///
/// let el = EventLoop::new();
/// let inputs = vec![
///     Deferred::<i32, JsError>::resolved(&el, 1),
///     Deferred::resolved(&el, 2),
/// ];
/// let joined = combinators::all(&el, inputs);
/// el.run_until_idle();
/// assert_eq!(joined.state(), DeferredState::Fulfilled(vec![1, 2]));
/// ```
pub fn all<T, E>(event_loop: &EventLoop, inputs: Vec<Deferred<T, E>>) -> Deferred<Vec<T>, E>
where
    T: Clone + 'static,
    E: RejectionReason,
{
    let (result, resolver) = Deferred::new(event_loop);
    trace!(promise = result.id(), inputs = inputs.len(), "all");
    if inputs.is_empty() {
        resolver.resolve(Vec::new());
        return result;
    }
    let slots = Slots::new(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        let slots = slots.clone();
        let on_value: Resolver<Vec<T>, E> = resolver.clone();
        let on_reason = resolver.clone();
        observe(
            input,
            move |value| {
                if let Some(values) = slots.fill(index, value) {
                    on_value.resolve(values);
                }
            },
            move |reason| on_reason.reject(reason),
        );
    }
    result
}

/// Settles the same way as the first input to settle.
///
/// An empty input never settles.
pub fn race<T, E>(event_loop: &EventLoop, inputs: Vec<Deferred<T, E>>) -> Deferred<T, E>
where
    T: Clone + 'static,
    E: RejectionReason,
{
    let (result, resolver) = Deferred::new(event_loop);
    trace!(promise = result.id(), inputs = inputs.len(), "race");
    for input in &inputs {
        let on_value = resolver.clone();
        let on_reason = resolver.clone();
        observe(
            input,
            move |value| on_value.resolve(value),
            move |reason| on_reason.reject(reason),
        );
    }
    result
}

/// Fulfills with the first fulfillment.
///
/// Rejects with an [`AggregateError`] holding every reason, in input order,
/// only once all inputs have rejected. An empty input rejects immediately.
pub fn any<T, E>(
    event_loop: &EventLoop,
    inputs: Vec<Deferred<T, E>>,
) -> Deferred<T, AggregateError<E>>
where
    T: Clone + 'static,
    E: RejectionReason,
{
    let (result, resolver) = Deferred::new(event_loop);
    trace!(promise = result.id(), inputs = inputs.len(), "any");
    if inputs.is_empty() {
        resolver.reject(AggregateError::new(Vec::new()));
        return result;
    }
    let slots = Slots::new(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        let slots = slots.clone();
        let on_value: Resolver<T, AggregateError<E>> = resolver.clone();
        let on_reason = resolver.clone();
        observe(
            input,
            move |value| on_value.resolve(value),
            move |reason| {
                if let Some(errors) = slots.fill(index, reason) {
                    on_reason.reject(AggregateError::new(errors));
                }
            },
        );
    }
    result
}

/// Fulfills once every input has settled, with one [`Outcome`] per input in
/// input order. Never rejects.
pub fn all_settled<T, E>(
    event_loop: &EventLoop,
    inputs: Vec<Deferred<T, E>>,
) -> Deferred<Vec<Outcome<T, E>>, E>
where
    T: Clone + 'static,
    E: RejectionReason,
{
    let (result, resolver) = Deferred::new(event_loop);
    trace!(promise = result.id(), inputs = inputs.len(), "all_settled");
    if inputs.is_empty() {
        resolver.resolve(Vec::new());
        return result;
    }
    let slots = Slots::new(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        let fulfilled = (slots.clone(), resolver.clone());
        let rejected = (slots.clone(), resolver.clone());
        observe(
            input,
            move |value| {
                let (slots, resolver) = fulfilled;
                if let Some(outcomes) = slots.fill(index, Outcome::Fulfilled(value)) {
                    resolver.resolve(outcomes);
                }
            },
            move |reason| {
                let (slots, resolver) = rejected;
                if let Some(outcomes) = slots.fill(index, Outcome::Rejected(reason)) {
                    resolver.resolve(outcomes);
                }
            },
        );
    }
    result
}
