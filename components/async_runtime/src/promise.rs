//! Deferred values following the Promise/A+ contract.
//!
//! A [`Deferred`] is a shared handle to a cell that starts `Pending` and
//! settles exactly once. Its [`Resolver`] is the write side: the first call
//! to `resolve` or `reject` wins, later calls are ignored.
//!
//! Callbacks registered with `then`/`catch`/`finally` never run inline.
//! When the cell settles, each registered reaction becomes one microtask on
//! the owning [`EventLoop`]; registering on an already-settled cell queues
//! the microtask immediately.

use crate::event_loop::{EventLoop, WeakEventLoop};
use crate::reaction::{callback, invoke, OnFulfilled, Reaction, ReactionFn};
use core_types::{JsError, RejectionReason, TaskError, UnhandledRejection};
use std::cell::RefCell;
use std::convert::identity;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

/// The state of a Deferred.
///
/// Once settled (Fulfilled or Rejected), a Deferred cannot change state.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredState<T, E> {
    /// The initial state; neither fulfilled nor rejected.
    Pending,
    /// Settled with a value.
    Fulfilled(T),
    /// Settled with a rejection reason.
    Rejected(E),
}

impl<T, E> DeferredState<T, E> {
    /// Returns true while unsettled.
    pub fn is_pending(&self) -> bool {
        matches!(self, DeferredState::Pending)
    }

    /// Returns true if settled with a value.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, DeferredState::Fulfilled(_))
    }

    /// Returns true if settled with a reason.
    pub fn is_rejected(&self) -> bool {
        matches!(self, DeferredState::Rejected(_))
    }
}

impl<T: Clone, E: Clone> DeferredState<T, E> {
    /// The settled outcome, or `None` while pending.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        match self {
            DeferredState::Pending => None,
            DeferredState::Fulfilled(value) => Some(Ok(value.clone())),
            DeferredState::Rejected(reason) => Some(Err(reason.clone())),
        }
    }
}

/// What a deferred is resolved with: a plain value or another deferred whose
/// outcome it adopts.
pub enum Resolution<T, E> {
    /// Fulfill with this value.
    Value(T),
    /// Follow this deferred and settle the same way once it settles.
    Pending(Deferred<T, E>),
}

/// Conversion into a [`Resolution`].
///
/// Implemented for plain values (fulfill directly) and for [`Deferred`]
/// (adopt its eventual outcome), so `resolve` and `then` callbacks accept
/// either.
pub trait IntoResolution<T, E> {
    /// Performs the conversion.
    fn into_resolution(self) -> Resolution<T, E>;
}

impl<T, E> IntoResolution<T, E> for T {
    fn into_resolution(self) -> Resolution<T, E> {
        Resolution::Value(self)
    }
}

impl<T, E> IntoResolution<T, E> for Deferred<T, E> {
    fn into_resolution(self) -> Resolution<T, E> {
        Resolution::Pending(self)
    }
}

impl<T, E> IntoResolution<T, E> for Resolution<T, E> {
    fn into_resolution(self) -> Resolution<T, E> {
        self
    }
}

type CellRef<T, E> = Rc<RefCell<PromiseCell<T, E>>>;

struct PromiseCell<T, E> {
    id: u64,
    state: DeferredState<T, E>,
    /// Reactions registered while pending, in registration order.
    reactions: Vec<ReactionFn<T, E>>,
    /// Set once any reaction was registered.
    handled: bool,
    /// Set by the first `resolve`/`reject`, even if settlement is deferred
    /// by adoption.
    locked: bool,
    /// The deferred this one is adopting, while pending.
    follows: Option<Weak<RefCell<PromiseCell<T, E>>>>,
    event_loop: WeakEventLoop,
    render: fn(&E) -> String,
}

impl<T, E> Drop for PromiseCell<T, E> {
    fn drop(&mut self) {
        if self.handled {
            return;
        }
        if let DeferredState::Rejected(reason) = &self.state {
            let rejection = UnhandledRejection {
                promise_id: self.id,
                reason: (self.render)(reason),
            };
            match self.event_loop.upgrade() {
                Some(event_loop) => event_loop.track_unhandled(rejection),
                None => warn!(%rejection, "unhandled promise rejection after its loop was dropped"),
            }
        }
    }
}

fn render_reason<E: fmt::Display>(reason: &E) -> String {
    reason.to_string()
}

/// A deferred value: the read side of a promise.
///
/// Cloning yields another handle to the same cell.
///
/// # Examples
///
/// ```
/// use async_runtime::{Deferred, DeferredState, EventLoop};
/// use core_types::JsError;
///
/// let event_loop = EventLoop::new();
/// let doubled = Deferred::<i32, JsError>::resolved(&event_loop, 1)
///     .then(|x| Ok(x + 1))
///     .then(|x| Ok(x * 2));
///
/// assert!(doubled.is_pending());
/// event_loop.run_until_idle();
/// assert_eq!(doubled.state(), DeferredState::Fulfilled(4));
/// ```
pub struct Deferred<T, E = JsError> {
    cell: CellRef<T, E>,
}

/// The write side of a promise: settles its [`Deferred`] once.
///
/// Clones share the same one-shot capability.
pub struct Resolver<T, E = JsError> {
    cell: CellRef<T, E>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T, E> Deferred<T, E>
where
    T: Clone + 'static,
    E: RejectionReason,
{
    /// Creates a pending deferred and its resolver.
    pub fn new(event_loop: &EventLoop) -> (Self, Resolver<T, E>) {
        Self::with_cell(event_loop.downgrade(), event_loop.next_promise_id())
    }

    /// A deferred already fulfilled with `value`.
    pub fn resolved(event_loop: &EventLoop, value: T) -> Self {
        let (deferred, resolver) = Self::new(event_loop);
        resolver.resolve(value);
        deferred
    }

    /// A deferred already rejected with `reason`.
    pub fn rejected(event_loop: &EventLoop, reason: E) -> Self {
        let (deferred, resolver) = Self::new(event_loop);
        resolver.reject(reason);
        deferred
    }

    /// A deferred resolved with a value or adopting another deferred.
    pub fn from_resolution<R>(event_loop: &EventLoop, value: R) -> Self
    where
        R: IntoResolution<T, E>,
    {
        let (deferred, resolver) = Self::new(event_loop);
        resolver.resolve(value);
        deferred
    }

    fn with_cell(event_loop: WeakEventLoop, id: u64) -> (Self, Resolver<T, E>) {
        trace!(promise = id, "deferred created");
        let cell = Rc::new(RefCell::new(PromiseCell {
            id,
            state: DeferredState::Pending,
            reactions: Vec::new(),
            handled: false,
            locked: false,
            follows: None,
            event_loop,
            render: render_reason::<E>,
        }));
        (Self { cell: cell.clone() }, Resolver { cell })
    }

    /// Creates the pending deferred returned by `then` and friends, on the
    /// same loop as `self`.
    fn derive<U: Clone + 'static>(&self) -> (Deferred<U, E>, Resolver<U, E>) {
        let event_loop = self.cell.borrow().event_loop.clone();
        let id = event_loop
            .upgrade()
            .map(|event_loop| event_loop.next_promise_id())
            .unwrap_or(0);
        Deferred::<U, E>::with_cell(event_loop, id)
    }

    /// Returns the id assigned by the event loop.
    pub fn id(&self) -> u64 {
        self.cell.borrow().id
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> DeferredState<T, E> {
        self.cell.borrow().state.clone()
    }

    /// Returns true while unsettled.
    pub fn is_pending(&self) -> bool {
        self.cell.borrow().state.is_pending()
    }

    /// Returns true if fulfilled.
    pub fn is_fulfilled(&self) -> bool {
        self.cell.borrow().state.is_fulfilled()
    }

    /// Returns true if rejected.
    pub fn is_rejected(&self) -> bool {
        self.cell.borrow().state.is_rejected()
    }

    /// Returns true if both handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// Registers a fulfillment handler.
    ///
    /// A rejection passes through to the returned deferred untouched. The
    /// handler may return a plain value or another deferred to adopt; an
    /// `Err` or a panic rejects the returned deferred.
    pub fn then<U, R, F>(&self, on_fulfilled: F) -> Deferred<U, E>
    where
        U: Clone + 'static,
        R: IntoResolution<U, E> + 'static,
        F: FnOnce(T) -> Result<R, E> + 'static,
    {
        let (next, downstream) = self.derive();
        let reaction = Reaction::new(OnFulfilled::Call(callback(on_fulfilled)), None, downstream);
        self.subscribe(reaction.into_job());
        next
    }

    /// Registers both a fulfillment and a rejection handler.
    pub fn then_or_else<U, R, S, F, G>(&self, on_fulfilled: F, on_rejected: G) -> Deferred<U, E>
    where
        U: Clone + 'static,
        R: IntoResolution<U, E> + 'static,
        S: IntoResolution<U, E> + 'static,
        F: FnOnce(T) -> Result<R, E> + 'static,
        G: FnOnce(E) -> Result<S, E> + 'static,
    {
        let (next, downstream) = self.derive();
        let reaction = Reaction::new(
            OnFulfilled::Call(callback(on_fulfilled)),
            Some(callback(on_rejected)),
            downstream,
        );
        self.subscribe(reaction.into_job());
        next
    }

    /// Registers a rejection handler; a fulfillment value passes through.
    pub fn catch<R, G>(&self, on_rejected: G) -> Deferred<T, E>
    where
        R: IntoResolution<T, E> + 'static,
        G: FnOnce(E) -> Result<R, E> + 'static,
    {
        let (next, downstream) = self.derive();
        let reaction = Reaction::new(
            OnFulfilled::Forward(identity),
            Some(callback(on_rejected)),
            downstream,
        );
        self.subscribe(reaction.into_job());
        next
    }

    /// Runs `on_settle` whatever the outcome.
    ///
    /// The original outcome passes through unchanged unless `on_settle`
    /// fails, in which case its reason replaces the outcome.
    pub fn finally<F>(&self, on_settle: F) -> Deferred<T, E>
    where
        F: FnOnce() -> Result<(), E> + 'static,
    {
        let (next, downstream) = self.derive();
        self.subscribe(Box::new(move |outcome: Result<T, E>| match invoke(on_settle) {
            Ok(()) => downstream.settle_with(outcome),
            Err(reason) => downstream.reject(reason),
        }));
        next
    }

    /// Like [`finally`](Self::finally), but waits for the deferred returned
    /// by `on_settle` before passing the original outcome through.
    ///
    /// A rejection of that deferred replaces the original outcome.
    pub fn finally_await<U, F>(&self, on_settle: F) -> Deferred<T, E>
    where
        U: Clone + 'static,
        F: FnOnce() -> Deferred<U, E> + 'static,
    {
        let (next, downstream) = self.derive();
        self.subscribe(Box::new(move |outcome: Result<T, E>| {
            match invoke(move || Ok(on_settle())) {
                Ok(waiter) => waiter.subscribe(Box::new(move |waited: Result<U, E>| match waited {
                    Ok(_) => downstream.settle_with(outcome),
                    Err(reason) => downstream.reject(reason),
                })),
                Err(reason) => downstream.reject(reason),
            }
        }));
        next
    }

    /// Registers a reaction, or queues it right away if already settled.
    fn subscribe(&self, job: ReactionFn<T, E>) {
        let (outcome, event_loop) = {
            let mut cell = self.cell.borrow_mut();
            cell.handled = true;
            match cell.state.outcome() {
                None => {
                    cell.reactions.push(job);
                    return;
                }
                Some(outcome) => (outcome, cell.event_loop.upgrade()),
            }
        };
        match event_loop {
            Some(event_loop) => event_loop.queue_microtask(move || {
                job(outcome);
                Ok(())
            }),
            None => debug!("reaction dropped: event loop is gone"),
        }
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + 'static,
    E: RejectionReason,
{
    /// Resolves with a plain value, or adopts the outcome of a deferred.
    ///
    /// Ignored if this resolver (or a clone) was already used. Resolving a
    /// deferred with itself, directly or through a chain of adoptions,
    /// rejects it with [`TaskError::ChainCycle`].
    pub fn resolve<R>(&self, value: R)
    where
        R: IntoResolution<T, E>,
    {
        if !self.claim() {
            return;
        }
        match <R as IntoResolution<T, E>>::into_resolution(value) {
            Resolution::Value(value) => settle(&self.cell, Ok(value)),
            Resolution::Pending(source) => adopt(&self.cell, source),
        }
    }

    /// Rejects with `reason`. Ignored if already resolved or rejected.
    pub fn reject(&self, reason: E) {
        if !self.claim() {
            return;
        }
        settle(&self.cell, Err(reason));
    }

    /// Returns true once `resolve` or `reject` has been called.
    pub fn is_resolved(&self) -> bool {
        self.cell.borrow().locked
    }

    /// Returns a read handle to the deferred this resolver settles.
    pub fn deferred(&self) -> Deferred<T, E> {
        Deferred {
            cell: self.cell.clone(),
        }
    }

    pub(crate) fn settle_with(&self, outcome: Result<T, E>) {
        match outcome {
            Ok(value) => self.resolve(value),
            Err(reason) => self.reject(reason),
        }
    }

    fn claim(&self) -> bool {
        let mut cell = self.cell.borrow_mut();
        if cell.locked {
            trace!(promise = cell.id, "settlement ignored: already resolved");
            return false;
        }
        cell.locked = true;
        true
    }
}

/// Moves a cell out of `Pending` and queues one microtask per reaction.
fn settle<T, E>(cell: &CellRef<T, E>, outcome: Result<T, E>)
where
    T: Clone + 'static,
    E: RejectionReason,
{
    let (reactions, event_loop, id) = {
        let mut cell = cell.borrow_mut();
        if !cell.state.is_pending() {
            return;
        }
        cell.state = match &outcome {
            Ok(value) => DeferredState::Fulfilled(value.clone()),
            Err(reason) => DeferredState::Rejected(reason.clone()),
        };
        cell.locked = true;
        cell.follows = None;
        (
            mem::take(&mut cell.reactions),
            cell.event_loop.upgrade(),
            cell.id,
        )
    };
    debug!(
        promise = id,
        fulfilled = outcome.is_ok(),
        reactions = reactions.len(),
        "deferred settled"
    );
    let Some(event_loop) = event_loop else {
        return;
    };
    for job in reactions {
        let outcome = outcome.clone();
        event_loop.queue_microtask(move || {
            job(outcome);
            Ok(())
        });
    }
}

/// Makes `cell` follow `source`, rejecting on a chaining cycle.
fn adopt<T, E>(cell: &CellRef<T, E>, source: Deferred<T, E>)
where
    T: Clone + 'static,
    E: RejectionReason,
{
    if forms_cycle(cell, &source.cell) {
        let id = cell.borrow().id;
        debug!(promise = id, "chaining cycle detected");
        settle(cell, Err(E::from(TaskError::ChainCycle(id))));
        return;
    }
    cell.borrow_mut().follows = Some(Rc::downgrade(&source.cell));
    let target = cell.clone();
    source.subscribe(Box::new(move |outcome: Result<T, E>| settle(&target, outcome)));
}

/// Walks the adoption chain starting at `start` looking for `cell`.
fn forms_cycle<T, E>(cell: &CellRef<T, E>, start: &CellRef<T, E>) -> bool {
    let mut cursor = Some(start.clone());
    while let Some(current) = cursor {
        if Rc::ptr_eq(&current, cell) {
            return true;
        }
        cursor = current.borrow().follows.as_ref().and_then(Weak::upgrade);
    }
    false
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(cell) = self.cell.try_borrow() else {
            return f.write_str("Deferred { <busy> }");
        };
        let state = match cell.state {
            DeferredState::Pending => "pending",
            DeferredState::Fulfilled(_) => "fulfilled",
            DeferredState::Rejected(_) => "rejected",
        };
        f.debug_struct("Deferred")
            .field("id", &cell.id)
            .field("state", &state)
            .field("reactions", &cell.reactions.len())
            .finish()
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.try_borrow() {
            Ok(cell) => f
                .debug_struct("Resolver")
                .field("id", &cell.id)
                .field("resolved", &cell.locked)
                .finish(),
            Err(_) => f.write_str("Resolver { <busy> }"),
        }
    }
}
