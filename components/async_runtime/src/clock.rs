//! Time sources for the event loop.
//!
//! Timer due times are expressed in milliseconds since the loop started.
//! [`VirtualClock`] jumps straight to the next due time, which makes every
//! run deterministic; [`SystemClock`] sleeps until the wall clock catches up.

use std::thread;
use std::time::{Duration, Instant};

/// A source of time for the event loop.
pub trait Clock {
    /// Milliseconds elapsed since the clock's origin.
    fn now(&self) -> u64;

    /// Moves the clock forward to `deadline`.
    ///
    /// Never moves backwards: a deadline in the past leaves the clock as is.
    fn advance_to(&mut self, deadline: u64);
}

/// Deterministic clock that only moves when the loop advances it.
#[derive(Debug, Default, Clone)]
pub struct VirtualClock {
    now: u64,
}

impl VirtualClock {
    /// Creates a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock starting at `now`.
    pub fn starting_at(now: u64) -> Self {
        Self { now }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> u64 {
        self.now
    }

    fn advance_to(&mut self, deadline: u64) {
        self.now = self.now.max(deadline);
    }
}

/// Wall-clock time source for hosts running real timers.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose origin is the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn advance_to(&mut self, deadline: u64) {
        let now = self.now();
        if deadline > now {
            thread::sleep(Duration::from_millis(deadline - now));
        }
    }
}
