//! Command-line front end for validating, planning and simulating workflow
//! definitions.

pub mod cli;
pub mod commands;
pub mod logging;

use anyhow::Result;
use cli::{CliArgs, Command};
use commands::SimulateOptions;

/// Dispatches a parsed command, writing its report to stdout.
pub async fn run(args: CliArgs) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Command::Validate { file } => commands::validate(&file, &mut out).await,
        Command::Plan { file, json } => commands::plan(&file, json, &mut out).await,
        Command::Simulate {
            file,
            log_dir,
            timeout_ms,
            max_concurrency,
        } => {
            let options = SimulateOptions {
                log_dir,
                timeout_ms,
                max_concurrency,
            };
            commands::simulate(&file, &options, &mut out).await
        }
    }
}
