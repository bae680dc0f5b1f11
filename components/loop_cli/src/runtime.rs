//! Runtime orchestration for scenario runs
//!
//! The Runtime owns the loop configuration and builds a fresh event loop for
//! every scenario, so runs never share queues or clocks.

use crate::cli::Cli;
use crate::error::{CliError, CliResult};
use crate::scenarios::{Scenario, Trace, TraceLine};
use async_runtime::{EventLoop, LoopConfig, RunReport, SystemClock};
use core_types::UnhandledRejection;
use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use tracing::{info, Level};

/// Installs the stderr log subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .with_ansi(false)
        .try_init();
}

/// Everything a scenario run produced.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    /// Trace lines in the order they were logged
    pub lines: Vec<TraceLine>,
    /// Counters and job failures reported by the loop
    pub report: RunReport,
    /// Rejected deferreds nobody handled
    pub unhandled: Vec<UnhandledRejection>,
    /// Loop time when the run went idle
    pub finished_at: u64,
}

impl ScenarioRun {
    /// The trace text without timestamps.
    pub fn texts(&self) -> Vec<&str> {
        self.lines.iter().map(|line| line.text.as_str()).collect()
    }
}

/// Runs scenarios against freshly built event loops.
#[derive(Debug, Clone, Default)]
pub struct Runtime {
    config: LoopConfig,
    real_clock: bool,
}

impl Runtime {
    /// Create a runtime with the given loop configuration
    ///
    /// # Example
    /// ```
    /// use async_runtime::LoopConfig;
    /// use loop_cli::{Runtime, Scenario};
    ///
    /// let runtime = Runtime::new(LoopConfig::default());
    /// let run = runtime.run(Scenario::Ordering);
    /// assert_eq!(run.texts().first(), Some(&"script start"));
    /// ```
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            real_clock: false,
        }
    }

    /// Builds a runtime from parsed arguments, loading `--config` if given.
    ///
    /// # Errors
    /// Returns `CliError` if the config file cannot be read or parsed
    pub fn from_cli(cli: &Cli) -> CliResult<Self> {
        let config = match &cli.config {
            Some(path) => load_config(path)?,
            None => LoopConfig::default(),
        };
        Ok(Self::new(config).with_real_clock(cli.real_clock))
    }

    /// Use the wall clock instead of the virtual clock
    pub fn with_real_clock(mut self, enabled: bool) -> Self {
        self.real_clock = enabled;
        self
    }

    /// Returns the loop configuration
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Installs `scenario` on a new event loop and runs it until idle.
    pub fn run(&self, scenario: Scenario) -> ScenarioRun {
        let unhandled = Rc::new(RefCell::new(Vec::new()));
        let sink = unhandled.clone();
        let mut builder = EventLoop::builder()
            .config(self.config.clone())
            .on_unhandled_rejection(move |rejection| sink.borrow_mut().push(rejection.clone()));
        if self.real_clock {
            builder = builder.clock(SystemClock::new());
        }
        let event_loop = builder.build();

        info!(scenario = scenario.name(), real_clock = self.real_clock, "running scenario");
        let trace = Trace::new(&event_loop);
        scenario.install(&event_loop, &trace);
        let report = event_loop.run_until_idle();
        let finished_at = event_loop.now();
        info!(
            scenario = scenario.name(),
            macrotasks = report.macrotasks,
            microtasks = report.microtasks,
            "scenario finished"
        );

        let unhandled = unhandled.borrow().clone();
        ScenarioRun {
            lines: trace.lines(),
            report,
            unhandled,
            finished_at,
        }
    }
}

/// Reads a [`LoopConfig`] from a JSON file.
///
/// # Errors
/// Returns `CliError::Io` if the file cannot be read and
/// `CliError::Config` if it is not valid configuration
pub fn load_config(path: &str) -> CliResult<LoopConfig> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Config {
        path: path.to_string(),
        source,
    })
}
