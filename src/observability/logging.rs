//! Structured logging.
//!
//! Priority for the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `RUST_LOG` environment variable
//! 3. `astrond=info`
//!
//! Output goes to stderr so that `--check` can print JSON on stdout.

use std::error::Error;

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::LogLevel;

const DEFAULT_FILTER: &str = "astrond=info";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<(), TryInitError> {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(format!("astrond={}", level.as_str())),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init()
}

/// `err` followed by each of its sources, separated by `: `.
pub fn error_chain(err: &dyn Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
