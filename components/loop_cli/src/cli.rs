//! Command-line arguments

use crate::scenarios::Scenario;
use clap::Parser;
use tracing::Level;

/// Replays event loop ordering scenarios and prints their trace.
#[derive(Debug, Parser)]
#[command(name = "corten-loop", version)]
pub struct Cli {
    /// Scenario to run; runs every scenario when omitted
    #[arg(short, long, value_enum)]
    pub scenario: Option<Scenario>,

    /// List the available scenarios and exit
    #[arg(short, long)]
    pub list: bool,

    /// JSON file with loop configuration
    #[arg(short, long)]
    pub config: Option<String>,

    /// Sleep for real instead of jumping the virtual clock
    #[arg(long)]
    pub real_clock: bool,

    /// Log level for runtime diagnostics on stderr
    #[arg(long, default_value = "warn")]
    pub log_level: Level,
}
