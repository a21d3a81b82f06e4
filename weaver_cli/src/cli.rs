//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for `weaver`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "weaver",
    version,
    about = "Validate, plan and simulate workflow DAGs.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `WEAVER_LOG` or `info` is used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Check a workflow definition and report every problem found
    Validate {
        /// Path to the workflow definition (YAML)
        file: PathBuf,
    },

    /// Print the batches a run would execute, in order
    Plan {
        /// Path to the workflow definition (YAML)
        file: PathBuf,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the workflow with handlers that echo each node's configuration
    Simulate {
        /// Path to the workflow definition (YAML)
        file: PathBuf,

        /// Directory to write the run log to
        #[arg(long, value_name = "DIR")]
        log_dir: Option<PathBuf>,

        /// Batch timeout in milliseconds, overriding the definition's settings
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Concurrency cap, overriding the definition's settings
        #[arg(long, value_name = "N")]
        max_concurrency: Option<usize>,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
