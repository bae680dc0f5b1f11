//! Single-threaded cooperative scheduler with promise-style deferred values.
//!
//! This crate provides:
//! - An event loop with a microtask queue, a timer (macrotask) queue and a
//!   pluggable clock
//! - [`Deferred`] values following the Promise/A+ resolution procedure
//! - Combinators (`all`, `race`, `any`, `all_settled`) and timer helpers
//!
//! # Overview
//!
//! - [`EventLoop`] - owns the queues; the only thing that runs jobs
//! - [`Deferred`] / [`Resolver`] - read and write sides of a promise
//! - [`combinators`] - joins over several deferreds
//! - [`tools`] - `delay`, `reject_after` and `retry`
//!
//! Ordering guarantees: every microtask queued before a macrotask starts
//! runs before it; timers fire by due time, FIFO among equal due times;
//! reactions on one deferred run in registration order.
//!
//! # Examples
//!
//! ## Event Loop Usage
//!
//! ```
//! use async_runtime::EventLoop;
//!
//! let event_loop = EventLoop::new();
//! event_loop.set_timeout(|| Ok(()), 100);
//! let report = event_loop.run_until_idle();
//! assert_eq!(report.macrotasks, 1);
//! assert_eq!(event_loop.now(), 100);
//! ```
//!
//! ## Deferred Usage
//!
//! ```
//! use async_runtime::{Deferred, DeferredState, EventLoop};
//! use core_types::JsError;
//!
//! let event_loop = EventLoop::new();
//! let (deferred, resolver) = Deferred::<String, JsError>::new(&event_loop);
//! let message = deferred
//!     .then(|v| Ok(v.len()))
//!     .catch(|_| Ok(0usize));
//!
//! resolver.resolve("hello".to_string());
//! event_loop.run_until_idle();
//! assert_eq!(message.state(), DeferredState::Fulfilled(5));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod combinators;
pub mod config;
pub mod event_loop;
pub mod promise;
mod reaction;
pub mod task_queue;
pub mod tools;

// Re-export main types at crate root
pub use clock::{Clock, SystemClock, VirtualClock};
pub use combinators::Outcome;
pub use config::LoopConfig;
pub use event_loop::{EventLoop, EventLoopBuilder, RunReport};
pub use promise::{Deferred, DeferredState, IntoResolution, Resolution, Resolver};
pub use task_queue::{MicroTask, MicrotaskQueue, Task, TaskQueueStats, TimerHandle, TimerQueue};
