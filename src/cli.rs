//! Command-line arguments.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::RESERVED_CEILING;
use crate::lifecycle::startup::DEFAULT_MAX_CONNECTIONS;

/// Command-line arguments for `astrond`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "astrond",
    version,
    about = "Message director daemon for a distributed object cluster.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the YAML configuration file.
    #[arg(value_name = "CONFIG", default_value = "astrond.yml")]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RUST_LOG` or `astrond=info` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the configuration, print it as JSON and exit.
    #[arg(long)]
    pub check: bool,

    /// First channel that roles may be assigned.
    #[arg(long, value_name = "CHANNEL", default_value_t = RESERVED_CEILING)]
    pub reserved_channel_ceiling: u64,

    /// Serve Prometheus metrics on this address.
    #[arg(long, value_name = "ADDR")]
    pub metrics_address: Option<SocketAddr>,

    /// Concurrent connections allowed per listener.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: usize,
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

pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["astrond"]).unwrap();
        assert_eq!(args.config, PathBuf::from("astrond.yml"));
        assert_eq!(args.reserved_channel_ceiling, 1000);
        assert!(!args.check);
        assert!(args.log_level.is_none());
        assert!(args.metrics_address.is_none());
    }

    #[test]
    fn test_flags() {
        let args = CliArgs::try_parse_from([
            "astrond",
            "--check",
            "--log-level",
            "debug",
            "--reserved-channel-ceiling",
            "5000",
            "cluster.yml",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("cluster.yml"));
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        assert_eq!(args.reserved_channel_ceiling, 5000);
        assert!(args.check);
    }
}
