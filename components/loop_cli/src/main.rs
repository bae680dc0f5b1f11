//! Corten event loop CLI
//!
//! Entry point for the scenario runner. Parses CLI arguments and delegates
//! to the Runtime for execution.

use clap::Parser as ClapParser;
use loop_cli::{init_tracing, Cli, Runtime, Scenario};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    if cli.list {
        for scenario in Scenario::ALL {
            println!("{:<16} {}", scenario.name(), scenario.description());
        }
        return Ok(());
    }

    let runtime = match Runtime::from_cli(&cli) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let scenarios = match cli.scenario {
        Some(scenario) => vec![scenario],
        None => Scenario::ALL.to_vec(),
    };

    for (i, scenario) in scenarios.into_iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("== {} ==", scenario.name());
        let run = runtime.run(scenario);
        for line in &run.lines {
            println!("{line}");
        }
        for error in &run.report.errors {
            println!("job error: {error}");
        }
        for rejection in &run.unhandled {
            println!("{rejection}");
        }
        println!(
            "-- {} macrotasks, {} microtasks, finished at t={}ms",
            run.report.macrotasks, run.report.microtasks, run.finished_at
        );
    }

    Ok(())
}
