//! Event loop scenario runner
//!
//! Provides the CLI definition, the scenario catalogue and the Runtime that
//! replays a scenario on a fresh event loop and collects its trace.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod runtime;
pub mod scenarios;

pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use runtime::{init_tracing, Runtime, ScenarioRun};
pub use scenarios::{Scenario, Trace, TraceLine};
