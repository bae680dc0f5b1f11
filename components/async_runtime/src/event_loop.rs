//! Event loop implementation.
//!
//! This module provides the scheduler that owns the microtask queue, the
//! timer queue and the clock. Each turn of the loop:
//! 1. Drains the microtask queue to exhaustion, including microtasks
//!    enqueued while draining
//! 2. Pops the earliest due macrotask, advances the clock to its due time
//!    and runs it
//! 3. Repeats
//!
//! Job failures never escape the loop. A job that returns an error or
//! panics is reported to the error sink and the loop moves on.

use crate::clock::{Clock, VirtualClock};
use crate::config::LoopConfig;
use crate::task_queue::{
    MicroTask, MicrotaskQueue, Task, TaskQueueStats, TimerHandle, TimerJob, TimerQueue,
};
use core_types::{JobError, JobKind, JsError, UnhandledRejection};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

type ErrorSink = Box<dyn FnMut(&JobError)>;
type RejectionHook = Box<dyn FnMut(&UnhandledRejection)>;

pub(crate) struct LoopInner {
    config: LoopConfig,
    microtasks: RefCell<MicrotaskQueue>,
    timers: RefCell<TimerQueue>,
    clock: RefCell<Box<dyn Clock>>,
    error_sink: RefCell<Option<ErrorSink>>,
    rejection_hook: RefCell<Option<RejectionHook>>,
    unhandled: RefCell<Vec<UnhandledRejection>>,
    next_promise_id: Cell<u64>,
}

impl Drop for LoopInner {
    /// Reports rejections dropped after the last checkpoint.
    fn drop(&mut self) {
        let pending = mem::take(self.unhandled.get_mut());
        if pending.is_empty() {
            return;
        }
        match self.rejection_hook.get_mut() {
            Some(hook) => {
                for rejection in &pending {
                    hook(rejection);
                }
            }
            None => {
                for rejection in &pending {
                    warn!(%rejection, "unhandled promise rejection");
                }
            }
        }
    }
}

/// Summary of one `run_*` call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Macrotasks executed
    pub macrotasks: usize,
    /// Microtasks executed
    pub microtasks: usize,
    /// Jobs that failed, in the order they failed
    pub errors: Vec<JobError>,
}

impl RunReport {
    /// Returns true if no job failed.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The event loop.
///
/// `EventLoop` is a cheap, cloneable handle; clones share the same queues.
/// Every deferred created through a loop schedules its reactions on it.
///
/// # Examples
///
/// ```
/// use async_runtime::EventLoop;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let event_loop = EventLoop::new();
/// let order = Rc::new(RefCell::new(Vec::new()));
///
/// let o = order.clone();
/// event_loop.set_timeout(move || { o.borrow_mut().push("timeout"); Ok(()) }, 0);
/// let o = order.clone();
/// event_loop.queue_microtask(move || { o.borrow_mut().push("microtask"); Ok(()) });
///
/// event_loop.run_until_idle();
/// assert_eq!(*order.borrow(), vec!["microtask", "timeout"]);
/// ```
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

/// A non-owning reference to an [`EventLoop`].
///
/// Deferred cells keep one of these so that a pending promise does not keep
/// its loop alive.
#[derive(Clone)]
pub(crate) struct WeakEventLoop(Weak<LoopInner>);

impl WeakEventLoop {
    pub(crate) fn upgrade(&self) -> Option<EventLoop> {
        self.0.upgrade().map(|inner| EventLoop { inner })
    }
}

/// Builder for configuring and creating an event loop.
///
/// # Examples
///
/// ```
/// use async_runtime::{EventLoop, LoopConfig};
///
/// let event_loop = EventLoop::builder()
///     .config(LoopConfig { max_turns: Some(10), ..LoopConfig::default() })
///     .error_sink(|err| eprintln!("job failed: {err}"))
///     .build();
/// assert_eq!(event_loop.config().max_turns, Some(10));
/// ```
pub struct EventLoopBuilder {
    config: LoopConfig,
    clock: Box<dyn Clock>,
    error_sink: Option<ErrorSink>,
    rejection_hook: Option<RejectionHook>,
}

impl EventLoopBuilder {
    /// Creates a builder with the default configuration and a virtual clock.
    pub fn new() -> Self {
        Self {
            config: LoopConfig::default(),
            clock: Box::new(VirtualClock::new()),
            error_sink: None,
            rejection_hook: None,
        }
    }

    /// Sets the loop configuration.
    pub fn config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the virtual clock, e.g. with a
    /// [`SystemClock`](crate::SystemClock).
    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Receives every job failure.
    pub fn error_sink<F>(mut self, sink: F) -> Self
    where
        F: FnMut(&JobError) + 'static,
    {
        self.error_sink = Some(Box::new(sink));
        self
    }

    /// Receives every rejected deferred dropped without a handler.
    pub fn on_unhandled_rejection<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&UnhandledRejection) + 'static,
    {
        self.rejection_hook = Some(Box::new(hook));
        self
    }

    /// Builds the event loop.
    pub fn build(self) -> EventLoop {
        EventLoop {
            inner: Rc::new(LoopInner {
                config: self.config,
                microtasks: RefCell::new(MicrotaskQueue::new()),
                timers: RefCell::new(TimerQueue::new()),
                clock: RefCell::new(self.clock),
                error_sink: RefCell::new(self.error_sink),
                rejection_hook: RefCell::new(self.rejection_hook),
                unhandled: RefCell::new(Vec::new()),
                next_promise_id: Cell::new(0),
            }),
        }
    }
}

impl Default for EventLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Creates a new EventLoop with empty queues and a virtual clock.
    pub fn new() -> Self {
        EventLoopBuilder::new().build()
    }

    /// Returns a builder for a customised loop.
    pub fn builder() -> EventLoopBuilder {
        EventLoopBuilder::new()
    }

    /// Returns the loop configuration.
    pub fn config(&self) -> &LoopConfig {
        &self.inner.config
    }

    /// Current time in milliseconds since the loop's clock origin.
    pub fn now(&self) -> u64 {
        self.inner.clock.borrow().now()
    }

    /// Schedules `job` to run as a macrotask after `delay` milliseconds.
    ///
    /// A zero delay still defers the job to a later turn of the loop.
    pub fn set_timeout<F>(&self, job: F, delay: u64) -> TimerHandle
    where
        F: FnOnce() -> Result<(), JsError> + 'static,
    {
        let due = self.now().saturating_add(delay);
        let handle = self.inner.timers.borrow_mut().schedule(due, Task::new(job));
        debug!(timer = handle.id(), due, "timeout scheduled");
        handle
    }

    /// Schedules `job` to run every `period` milliseconds until cleared.
    ///
    /// A zero period is treated as one millisecond so the clock keeps moving.
    pub fn set_interval<F>(&self, job: F, period: u64) -> TimerHandle
    where
        F: FnMut() -> Result<(), JsError> + 'static,
    {
        let period = period.max(1);
        let due = self.now().saturating_add(period);
        let callback: Rc<RefCell<dyn FnMut() -> Result<(), JsError>>> =
            Rc::new(RefCell::new(job));
        let handle = self
            .inner
            .timers
            .borrow_mut()
            .schedule_repeating(due, period, callback);
        debug!(timer = handle.id(), due, period, "interval scheduled");
        handle
    }

    /// Cancels a timeout that has not run yet.
    ///
    /// Unknown handles and timers that already ran are ignored.
    ///
    /// The cleared job and its captures are released once cancelled
    /// entries outnumber live timers, not necessarily right away.
    pub fn clear_timeout(&self, handle: TimerHandle) {
        let swept = {
            let mut timers = self.inner.timers.borrow_mut();
            if timers.cancel(handle) {
                debug!(timer = handle.id(), "timer cleared");
            }
            timers.compact()
        };
        if !swept.is_empty() {
            trace!(swept = swept.len(), "cancelled timers compacted");
        }
    }

    /// Stops an interval. Same semantics as [`clear_timeout`](Self::clear_timeout).
    pub fn clear_interval(&self, handle: TimerHandle) {
        self.clear_timeout(handle);
    }

    /// Adds a task to run on the next turn, like `set_timeout(task, 0)`.
    pub fn enqueue_task(&self, task: Task) -> TimerHandle {
        let due = self.now();
        self.inner.timers.borrow_mut().schedule(due, task)
    }

    /// Adds a microtask to the microtask queue.
    pub fn enqueue_microtask(&self, microtask: MicroTask) {
        self.inner.microtasks.borrow_mut().enqueue(microtask);
    }

    /// Queues `job` as a microtask.
    pub fn queue_microtask<F>(&self, job: F)
    where
        F: FnOnce() -> Result<(), JsError> + 'static,
    {
        self.enqueue_microtask(MicroTask::new(job));
    }

    /// Number of queued microtasks.
    pub fn pending_microtasks(&self) -> usize {
        self.inner.microtasks.borrow().len()
    }

    /// Number of live timers, intervals included.
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    /// Due time of the next live timer.
    pub fn next_timer_due(&self) -> Option<u64> {
        self.inner.timers.borrow().next_due()
    }

    /// Returns the number of queued jobs per queue.
    pub fn stats(&self) -> TaskQueueStats {
        TaskQueueStats {
            microtasks: self.pending_microtasks(),
            timers: self.pending_timers(),
        }
    }

    /// Returns true if both queues are empty.
    pub fn is_idle(&self) -> bool {
        self.inner.microtasks.borrow().is_empty() && self.inner.timers.borrow().is_empty()
    }

    /// Runs the loop until both queues are empty.
    ///
    /// With `max_turns` configured, stops after that many macrotasks even
    /// if timers remain.
    pub fn run_until_idle(&self) -> RunReport {
        let mut report = RunReport::default();
        self.checkpoint(&mut report);
        let mut turns = 0u64;
        loop {
            if let Some(max) = self.inner.config.max_turns {
                if turns >= max {
                    warn!(max_turns = max, "turn limit reached with timers pending");
                    break;
                }
            }
            if !self.run_next_macrotask(None, &mut report) {
                break;
            }
            turns += 1;
            self.checkpoint(&mut report);
        }
        debug!(
            macrotasks = report.macrotasks,
            microtasks = report.microtasks,
            errors = report.errors.len(),
            "event loop idle"
        );
        report
    }

    /// Runs every macrotask due at or before `deadline`, then advances the
    /// clock to `deadline`.
    pub fn run_until(&self, deadline: u64) -> RunReport {
        let mut report = RunReport::default();
        self.checkpoint(&mut report);
        while self.run_next_macrotask(Some(deadline), &mut report) {
            self.checkpoint(&mut report);
        }
        self.inner.clock.borrow_mut().advance_to(deadline);
        report
    }

    /// Performs one turn: drain microtasks, run one macrotask, drain again.
    ///
    /// Returns false if there was no macrotask to run.
    pub fn tick(&self) -> bool {
        let mut report = RunReport::default();
        self.checkpoint(&mut report);
        let ran = self.run_next_macrotask(None, &mut report);
        self.checkpoint(&mut report);
        ran
    }

    /// Performs a microtask checkpoint without running any macrotask.
    pub fn run_microtasks(&self) -> RunReport {
        let mut report = RunReport::default();
        self.checkpoint(&mut report);
        report
    }

    pub(crate) fn downgrade(&self) -> WeakEventLoop {
        WeakEventLoop(Rc::downgrade(&self.inner))
    }

    pub(crate) fn next_promise_id(&self) -> u64 {
        let id = self.inner.next_promise_id.get() + 1;
        self.inner.next_promise_id.set(id);
        id
    }

    /// Records a rejection nobody handled.
    ///
    /// Reported at the next checkpoint, or when the loop is dropped.
    pub(crate) fn track_unhandled(&self, rejection: UnhandledRejection) {
        match self.inner.unhandled.try_borrow_mut() {
            Ok(mut pending) => pending.push(rejection),
            Err(_) => warn!(%rejection, "unhandled rejection dropped while reporting"),
        }
    }

    /// Drains microtasks to exhaustion, then reports unhandled rejections.
    ///
    /// Repeats if a rejection hook queued more microtasks.
    fn checkpoint(&self, report: &mut RunReport) {
        loop {
            let mut drained = 0usize;
            loop {
                let next = self.inner.microtasks.borrow_mut().dequeue();
                let Some(job) = next else {
                    break;
                };
                drained += 1;
                if drained == self.inner.config.microtask_warn_threshold + 1 {
                    warn!(
                        threshold = self.inner.config.microtask_warn_threshold,
                        "microtask checkpoint is starving macrotasks"
                    );
                }
                self.run_job(JobKind::Microtask, move || job.run(), report);
            }
            report.microtasks += drained;
            if drained > 0 {
                trace!(drained, "microtask checkpoint done");
            }
            self.flush_unhandled_rejections();
            if self.inner.microtasks.borrow().is_empty() {
                break;
            }
        }
    }

    fn run_next_macrotask(&self, limit: Option<u64>, report: &mut RunReport) -> bool {
        let next = self.inner.timers.borrow_mut().pop_next(limit);
        let Some(timer) = next else {
            return false;
        };
        self.inner.clock.borrow_mut().advance_to(timer.due);
        report.macrotasks += 1;
        debug!(timer = timer.handle.id(), now = self.now(), "running macrotask");
        match timer.job {
            TimerJob::Once(task) => {
                self.run_job(JobKind::Macrotask, move || task.run(), report);
            }
            TimerJob::Repeat { period, callback } => {
                self.inner.timers.borrow_mut().rearm(
                    timer.handle,
                    timer.due,
                    period,
                    callback.clone(),
                );
                self.run_job(
                    JobKind::Macrotask,
                    move || {
                        let mut job = callback.borrow_mut();
                        (&mut *job)()
                    },
                    report,
                );
            }
        }
        true
    }

    fn run_job<F>(&self, kind: JobKind, job: F, report: &mut RunReport)
    where
        F: FnOnce() -> Result<(), JsError>,
    {
        let outcome = if self.inner.config.catch_panics {
            panic::catch_unwind(AssertUnwindSafe(job))
        } else {
            Ok(job())
        };
        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(source)) => JobError::Failed { kind, source },
            Err(payload) => JobError::Panicked {
                kind,
                message: panic_message(payload.as_ref()),
            },
        };
        warn!(%error, "job failed");
        self.report_job_error(&error);
        report.errors.push(error);
    }

    fn report_job_error(&self, error: &JobError) {
        let sink = self.inner.error_sink.borrow_mut().take();
        if let Some(mut sink) = sink {
            sink(error);
            let mut slot = self.inner.error_sink.borrow_mut();
            if slot.is_none() {
                *slot = Some(sink);
            }
        }
    }

    fn flush_unhandled_rejections(&self) {
        let pending = mem::take(&mut *self.inner.unhandled.borrow_mut());
        if pending.is_empty() {
            return;
        }
        let hook = self.inner.rejection_hook.borrow_mut().take();
        let Some(mut hook) = hook else {
            for rejection in &pending {
                warn!(%rejection, "unhandled promise rejection");
            }
            return;
        };
        for rejection in &pending {
            debug!(promise = rejection.promise_id, "reporting unhandled rejection");
            hook(rejection);
        }
        let mut slot = self.inner.rejection_hook.borrow_mut();
        if slot.is_none() {
            *slot = Some(hook);
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("now", &self.now())
            .field("microtasks", &self.pending_microtasks())
            .field("timers", &self.pending_timers())
            .finish()
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
