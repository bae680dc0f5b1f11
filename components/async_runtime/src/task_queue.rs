//! Task and microtask queue management.
//!
//! This module provides the queues owned by the event loop:
//! - [`MicrotaskQueue`] - strict FIFO of promise continuations and
//!   `queue_microtask` jobs
//! - [`TimerQueue`] - macrotasks ordered by virtual due time, FIFO among
//!   entries due at the same time

use core_types::JsError;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::mem;
use std::rc::Rc;

/// Heap size below which cancelled entries are never compacted.
const COMPACT_FLOOR: usize = 32;

/// A task to be executed by the event loop.
///
/// Tasks represent work to be done in a later iteration of the event loop,
/// such as timer callbacks and I/O completions.
pub struct Task {
    callback: Box<dyn FnOnce() -> Result<(), JsError>>,
}

impl Task {
    /// Creates a new Task from a closure.
    ///
    /// # Arguments
    ///
    /// * `f` - The function to execute when the task runs
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), JsError> + 'static,
    {
        Self {
            callback: Box::new(f),
        }
    }

    /// Executes the task.
    pub fn run(self) -> Result<(), JsError> {
        (self.callback)()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task {{ ... }}")
    }
}

/// A microtask to be executed by the event loop.
///
/// Microtasks are drained completely after each task. Promise reactions and
/// `queue_microtask` callbacks are microtasks.
pub struct MicroTask {
    callback: Box<dyn FnOnce() -> Result<(), JsError>>,
}

impl MicroTask {
    /// Creates a new MicroTask from a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), JsError> + 'static,
    {
        Self {
            callback: Box::new(f),
        }
    }

    /// Executes the microtask.
    pub fn run(self) -> Result<(), JsError> {
        (self.callback)()
    }
}

impl std::fmt::Debug for MicroTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MicroTask {{ ... }}")
    }
}

/// A queue for microtasks.
///
/// Unbounded; jobs may enqueue further jobs while the queue is being drained.
#[derive(Debug, Default)]
pub struct MicrotaskQueue {
    queue: VecDeque<MicroTask>,
}

impl MicrotaskQueue {
    /// Creates a new empty MicrotaskQueue.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Adds a microtask to the end of the queue.
    pub fn enqueue(&mut self, microtask: MicroTask) {
        self.queue.push_back(microtask);
    }

    /// Removes and returns the next microtask from the queue.
    pub fn dequeue(&mut self) -> Option<MicroTask> {
        self.queue.pop_front()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of microtasks in the queue.
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

/// Snapshot of queue lengths.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskQueueStats {
    /// Queued microtasks
    pub microtasks: usize,
    /// Live timers
    pub timers: usize,
}

/// Handle returned by `set_timeout`/`set_interval`, used to cancel the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Returns the numeric id of the timer.
    pub fn id(&self) -> u64 {
        self.0
    }
}

type IntervalCallback = Rc<RefCell<dyn FnMut() -> Result<(), JsError>>>;

/// The work attached to a timer entry.
pub(crate) enum TimerJob {
    /// Runs once, then the timer is gone.
    Once(Task),
    /// Runs every `period` virtual milliseconds until cleared.
    Repeat {
        period: u64,
        callback: IntervalCallback,
    },
}

/// A popped timer, ready to run.
pub(crate) struct DueTimer {
    pub(crate) due: u64,
    pub(crate) handle: TimerHandle,
    pub(crate) job: TimerJob,
}

/// An entry in the timer heap.
///
/// Ordered by `(due, seq)` and reversed so that `BinaryHeap` pops the
/// earliest entry first.
struct TimerEntry {
    due: u64,
    seq: u64,
    handle: TimerHandle,
    job: TimerJob,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Macrotask queue keyed by virtual due time.
///
/// Cancelled timers stay in the heap until they reach the top or until
/// [`compact`](TimerQueue::compact) sweeps them; `live` is the source of
/// truth for what may still run.
#[derive(Default)]
pub struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    live: HashSet<TimerHandle>,
    next_seq: u64,
    next_id: u64,
}

impl TimerQueue {
    /// Creates a new empty TimerQueue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a one-shot task at `due`.
    pub fn schedule(&mut self, due: u64, task: Task) -> TimerHandle {
        let handle = self.allocate_handle();
        self.push(due, handle, TimerJob::Once(task));
        handle
    }

    /// Schedules a repeating callback, first firing at `due`.
    pub(crate) fn schedule_repeating(
        &mut self,
        due: u64,
        period: u64,
        callback: IntervalCallback,
    ) -> TimerHandle {
        let handle = self.allocate_handle();
        self.push(due, handle, TimerJob::Repeat { period, callback });
        handle
    }

    /// Re-arms an interval after it fired at `fired_at`.
    pub(crate) fn rearm(
        &mut self,
        handle: TimerHandle,
        fired_at: u64,
        period: u64,
        callback: IntervalCallback,
    ) {
        if self.live.contains(&handle) {
            self.push(
                fired_at.saturating_add(period),
                handle,
                TimerJob::Repeat { period, callback },
            );
        }
    }

    /// Cancels a timer. Returns false if it already ran or never existed.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.live.remove(&handle)
    }

    /// Sweeps cancelled entries once they outnumber the live timers.
    ///
    /// Returns the removed jobs so the caller can drop them after releasing
    /// any borrow of the queue.
    pub(crate) fn compact(&mut self) -> Vec<TimerJob> {
        if self.heap.len() <= COMPACT_FLOOR || self.heap.len() <= 2 * self.live.len() {
            return Vec::new();
        }
        let heap = mem::take(&mut self.heap);
        let live = &self.live;
        let (kept, dead): (Vec<_>, Vec<_>) = heap
            .into_iter()
            .partition(|entry| live.contains(&entry.handle));
        self.heap = BinaryHeap::from(kept);
        dead.into_iter().map(|entry| entry.job).collect()
    }

    /// Pops the earliest live timer, if it is due at or before `limit`.
    pub(crate) fn pop_next(&mut self, limit: Option<u64>) -> Option<DueTimer> {
        loop {
            let top = self.heap.peek()?;
            if !self.live.contains(&top.handle) {
                self.heap.pop();
                continue;
            }
            if limit.is_some_and(|limit| top.due > limit) {
                return None;
            }
            let entry = self.heap.pop()?;
            if matches!(entry.job, TimerJob::Once(_)) {
                self.live.remove(&entry.handle);
            }
            return Some(DueTimer {
                due: entry.due,
                handle: entry.handle,
                job: entry.job,
            });
        }
    }

    /// Due time of the earliest live timer.
    pub fn next_due(&self) -> Option<u64> {
        self.heap
            .iter()
            .filter(|entry| self.live.contains(&entry.handle))
            .map(|entry| entry.due)
            .min()
    }

    /// Returns true if no live timer remains.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Returns the number of live timers.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    fn allocate_handle(&mut self) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        self.live.insert(handle);
        handle
    }

    fn push(&mut self, due: u64, handle: TimerHandle, job: TimerJob) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerEntry {
            due,
            seq,
            handle,
            job,
        });
    }
}

impl std::fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("live", &self.live.len())
            .field("entries", &self.heap.len())
            .finish()
    }
}
