//! Event loop configuration.

use serde::{Deserialize, Serialize};

/// Tunables for an [`EventLoop`](crate::EventLoop).
///
/// Loadable from JSON; missing fields take their defaults.
///
/// # Examples
///
/// ```
/// use async_runtime::LoopConfig;
///
/// let config: LoopConfig = serde_json::from_str(r#"{ "max_turns": 100 }"#).unwrap();
/// assert_eq!(config.max_turns, Some(100));
/// assert!(config.catch_panics);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// A single microtask checkpoint running more jobs than this logs a
    /// warning. The checkpoint still drains to exhaustion.
    pub microtask_warn_threshold: usize,
    /// Upper bound on macrotask turns per `run_until_idle` call.
    pub max_turns: Option<u64>,
    /// Catch panics raised by jobs and report them to the error sink.
    pub catch_panics: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            microtask_warn_threshold: 10_000,
            max_turns: None,
            catch_panics: true,
        }
    }
}
