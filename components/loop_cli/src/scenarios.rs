//! Built-in scenarios
//!
//! Each scenario schedules work on an event loop and logs to a [`Trace`]
//! as its callbacks run. The printed order is the point: it shows where
//! synchronous code, microtasks and timers interleave.

use async_runtime::combinators::{all, all_settled, any, race};
use async_runtime::tools::{delay, reject_after, retry};
use async_runtime::{Deferred, EventLoop, Outcome};
use clap::ValueEnum;
use core_types::JsError;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Number of chained microtasks queued by [`Scenario::MicrotaskFlood`].
pub const FLOOD_SIZE: usize = 15_000;

/// One logged event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLine {
    /// Loop time when the line was logged
    pub at: u64,
    /// What happened
    pub text: String,
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[t={}ms] {}", self.at, self.text)
    }
}

/// Shared, timestamped log of a scenario run.
#[derive(Debug, Clone)]
pub struct Trace {
    event_loop: EventLoop,
    lines: Rc<RefCell<Vec<TraceLine>>>,
}

impl Trace {
    /// Creates an empty trace stamped with `event_loop`'s clock.
    pub fn new(event_loop: &EventLoop) -> Self {
        Self {
            event_loop: event_loop.clone(),
            lines: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Appends a line stamped with the current loop time.
    pub fn log(&self, text: impl Into<String>) {
        self.lines.borrow_mut().push(TraceLine {
            at: self.event_loop.now(),
            text: text.into(),
        });
    }

    /// Returns a copy of every line logged so far.
    pub fn lines(&self) -> Vec<TraceLine> {
        self.lines.borrow().clone()
    }
}

/// A job that logs `text` when it runs.
fn step(trace: &Trace, text: &'static str) -> impl FnOnce() -> Result<(), JsError> {
    let trace = trace.clone();
    move || {
        trace.log(text);
        Ok(())
    }
}

/// The scenarios the CLI can replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Synchronous code, promise callbacks, queueMicrotask and setTimeout
    Ordering,
    /// Timers and promises scheduled from inside each other
    Nested,
    /// A then/catch/finally chain with a failing step
    Chain,
    /// A long microtask chain holding back a zero-delay timer
    MicrotaskFlood,
    /// An API call raced against a deadline
    TimeoutRace,
    /// A flaky call retried with exponential backoff
    Retry,
    /// all, all_settled and any over delayed results
    All,
}

impl Scenario {
    /// Every scenario, in the order `--list` prints them.
    pub const ALL: [Scenario; 7] = [
        Scenario::Ordering,
        Scenario::Nested,
        Scenario::Chain,
        Scenario::MicrotaskFlood,
        Scenario::TimeoutRace,
        Scenario::Retry,
        Scenario::All,
    ];

    /// The name accepted by `--scenario`.
    pub fn name(self) -> &'static str {
        match self {
            Scenario::Ordering => "ordering",
            Scenario::Nested => "nested",
            Scenario::Chain => "chain",
            Scenario::MicrotaskFlood => "microtask-flood",
            Scenario::TimeoutRace => "timeout-race",
            Scenario::Retry => "retry",
            Scenario::All => "all",
        }
    }

    /// One-line summary for `--list`.
    pub fn description(self) -> &'static str {
        match self {
            Scenario::Ordering => "sync code, then microtasks, then timers",
            Scenario::Nested => "timers and promises scheduled from each other",
            Scenario::Chain => "value and error propagation through a chain",
            Scenario::MicrotaskFlood => "microtasks starving a zero-delay timer",
            Scenario::TimeoutRace => "race an API call against a deadline",
            Scenario::Retry => "retry a flaky call with backoff",
            Scenario::All => "all / all_settled / any",
        }
    }

    /// Schedules the scenario's work on `event_loop`. Runs the synchronous
    /// part immediately; the rest waits for the loop.
    pub fn install(self, event_loop: &EventLoop, trace: &Trace) {
        match self {
            Scenario::Ordering => ordering(event_loop, trace),
            Scenario::Nested => nested(event_loop, trace),
            Scenario::Chain => chain(event_loop, trace),
            Scenario::MicrotaskFlood => microtask_flood(event_loop, trace),
            Scenario::TimeoutRace => timeout_race(event_loop, trace),
            Scenario::Retry => flaky_retry(event_loop, trace),
            Scenario::All => joins(event_loop, trace),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn ordering(event_loop: &EventLoop, trace: &Trace) {
    trace.log("script start");
    event_loop.set_timeout(step(trace, "setTimeout"), 0);

    let (t1, t2) = (trace.clone(), trace.clone());
    let _ = Deferred::<(), JsError>::resolved(event_loop, ())
        .then(move |()| {
            t1.log("promise 1");
            Ok(())
        })
        .then(move |()| {
            t2.log("promise 2");
            Ok(())
        });

    event_loop.queue_microtask(step(trace, "queueMicrotask"));
    trace.log("script end");
}

fn nested(event_loop: &EventLoop, trace: &Trace) {
    let (el, t) = (event_loop.clone(), trace.clone());
    event_loop.set_timeout(
        move || {
            t.log("timeout 1");
            let inner = t.clone();
            let _ = Deferred::<(), JsError>::resolved(&el, ()).then(move |()| {
                inner.log("promise inside timeout 1");
                Ok(())
            });
            el.set_timeout(step(&t, "timeout inside timeout 1"), 0);
            Ok(())
        },
        0,
    );

    let (el, t) = (event_loop.clone(), trace.clone());
    let _ = Deferred::<(), JsError>::resolved(event_loop, ()).then(move |()| {
        t.log("promise 1");
        el.set_timeout(step(&t, "timeout inside promise 1"), 0);
        Ok(())
    });

    event_loop.set_timeout(step(trace, "timeout 2"), 0);
}

fn chain(event_loop: &EventLoop, trace: &Trace) {
    trace.log("fetching user");

    let (el, t) = (event_loop.clone(), trace.clone());
    let posts: Deferred<u32, JsError> =
        delay::<u32, JsError>(event_loop, 100, 7).then(move |id| {
            t.log(format!("user #{id} loaded, fetching posts"));
            Ok(delay::<u32, JsError>(&el, 200, 3))
        });

    let (t1, t2, t3, t4, t5) = (
        trace.clone(),
        trace.clone(),
        trace.clone(),
        trace.clone(),
        trace.clone(),
    );
    let _ = posts
        .then(move |count| {
            t1.log(format!("{count} posts loaded"));
            Ok(count * 2)
        })
        .then(move |comments| -> Result<u32, JsError> {
            t2.log(format!("{comments} comments found, loading authors"));
            Err(JsError::error("author service unavailable"))
        })
        .then(move |authors| {
            t3.log("authors loaded");
            Ok(authors)
        })
        .catch(move |e| {
            t4.log(format!("caught {e}"));
            Ok(0)
        })
        .finally(move || {
            t5.log("cleanup");
            Ok(())
        });

    // Nobody attaches a handler to this one.
    let _ = Deferred::<(), JsError>::rejected(event_loop, JsError::error("forgotten rejection"));
}

fn microtask_flood(event_loop: &EventLoop, trace: &Trace) {
    fn pump(event_loop: &EventLoop, trace: Trace, remaining: usize) {
        if remaining == 0 {
            trace.log(format!("flood drained after {FLOOD_SIZE} microtasks"));
            return;
        }
        let el = event_loop.clone();
        event_loop.queue_microtask(move || {
            pump(&el, trace, remaining - 1);
            Ok(())
        });
    }

    event_loop.set_timeout(step(trace, "setTimeout finally ran"), 0);
    trace.log("timeout scheduled, starting flood");
    pump(event_loop, trace.clone(), FLOOD_SIZE);
}

fn fetch_with_timeout(
    event_loop: &EventLoop,
    trace: &Trace,
    label: &'static str,
    latency: u64,
    limit: u64,
) {
    trace.log(format!("{label}: calling api (timeout {limit}ms)"));
    let api = delay::<String, JsError>(event_loop, latency, format!("{label} response"));
    let deadline = reject_after(
        event_loop,
        limit,
        JsError::error(format!("timeout: exceeded {limit}ms")),
    );
    let (t1, t2) = (trace.clone(), trace.clone());
    let _ = race(event_loop, vec![api, deadline]).then_or_else(
        move |response| {
            t1.log(format!("{label}: got {response}"));
            Ok(())
        },
        move |e| {
            t2.log(format!("{label}: {e}"));
            Ok(())
        },
    );
}

fn timeout_race(event_loop: &EventLoop, trace: &Trace) {
    fetch_with_timeout(event_loop, trace, "slow api", 5_000, 2_000);
    fetch_with_timeout(event_loop, trace, "fast api", 1_000, 2_000);
}

fn flaky_retry(event_loop: &EventLoop, trace: &Trace) {
    let (el, t) = (event_loop.clone(), trace.clone());
    let mut calls = 0u32;
    let factory = move || {
        calls += 1;
        let attempt = calls;
        t.log(format!("attempt {attempt}"));
        if attempt <= 3 {
            let failed = t.clone();
            reject_after::<String, JsError>(
                &el,
                100,
                JsError::error(format!("server error on attempt {attempt}")),
            )
            .catch(move |e| {
                failed.log(format!("attempt {attempt} failed: {e}"));
                Err::<String, JsError>(e)
            })
        } else {
            delay(&el, 100, format!("payload from attempt {attempt}"))
        }
    };

    let (t1, t2) = (trace.clone(), trace.clone());
    let _ = retry(event_loop, 4, factory)
        .set_interval(300)
        .exponential(true)
        .run()
        .then_or_else(
            move |data| {
                t1.log(format!("succeeded: {data}"));
                Ok(())
            },
            move |e| {
                t2.log(format!("gave up: {e}"));
                Ok(())
            },
        );
}

fn joins(event_loop: &EventLoop, trace: &Trace) {
    let fetch = |label: &str, ms: u64| delay::<String, JsError>(event_loop, ms, label.to_string());

    let t = trace.clone();
    let _ = all(
        event_loop,
        vec![fetch("user", 300), fetch("posts", 100), fetch("comments", 200)],
    )
    .then(move |values| {
        t.log(format!("all fulfilled: {}", values.join(", ")));
        Ok(())
    });

    let t = trace.clone();
    let _ = all_settled(
        event_loop,
        vec![
            fetch("profile", 50),
            reject_after(event_loop, 150, JsError::error("avatar missing")),
        ],
    )
    .then(move |outcomes| {
        let rendered: Vec<String> = outcomes
            .iter()
            .map(|outcome| match outcome {
                Outcome::Fulfilled(value) => format!("fulfilled({value})"),
                Outcome::Rejected(reason) => format!("rejected({reason})"),
            })
            .collect();
        t.log(format!("all settled: {}", rendered.join(", ")));
        Ok(())
    });

    let t = trace.clone();
    let _ = any(
        event_loop,
        vec![
            reject_after::<String, JsError>(event_loop, 250, JsError::error("mirror 1 down")),
            reject_after(event_loop, 350, JsError::error("mirror 2 down")),
        ],
    )
    .catch(move |e| {
        t.log(format!("any rejected: {e}"));
        Ok(String::new())
    });
}
