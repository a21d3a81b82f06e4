//! Logging setup for `weaver` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `WEAVER_LOG` environment variable (a level or a full filter directive,
//!    e.g. "weaver_core=debug,info")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that command output on STDOUT stays clean.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

/// Environment variable consulted when no CLI level is given.
pub const LOG_ENV: &str = "WEAVER_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let directive = resolve_directive(cli_level, std::env::var(LOG_ENV).ok().as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to initialise logging: {}", err))?;

    Ok(())
}

/// Picks the filter directive from the CLI level and the environment value.
pub fn resolve_directive(cli_level: Option<LogLevel>, env_value: Option<&str>) -> String {
    if let Some(level) = cli_level {
        return level.as_str().to_string();
    }

    match env_value.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => "info".to_string(),
    }
}
