//! astrond: message director daemon.
//!
//! ```text
//!   astrond.yml
//!       │
//!       ▼
//!   ┌────────┐   ┌──────────────────────────────┐   ┌─────────────┐
//!   │ config │──▶│ lifecycle::startup           │──▶│ net         │
//!   │ loader │   │ Validating → Binding → Serve │   │ accept loops│
//!   └────────┘   └──────────────┬───────────────┘   └─────────────┘
//!       │                       │ any defect
//!       ▼                       ▼
//!   routing::ChannelMap     exit status 1
//! ```
//!
//! Startup is all or nothing: the whole document is validated before the
//! first socket is bound, and a failed bind releases every socket bound
//! before it.

pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

use thiserror::Error;

use crate::cli::CliArgs;
use crate::config::ChannelPolicy;
use crate::lifecycle::{spawn_signal_listener, Bootstrap, BootstrapError, Shutdown};

pub use config::GlobalConfig;

/// Top-level failure of a daemon run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error("failed to start metrics exporter")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to render configuration")]
    Render(#[from] serde_json::Error),
}

/// Validate, bind and serve until a termination signal arrives.
///
/// With `--check`, stops after validation and prints the configuration. The
/// metrics exporter, when requested, starts after binding succeeded.
pub async fn run(args: CliArgs) -> Result<(), RunError> {
    let bootstrap = Bootstrap::new(ChannelPolicy::new(args.reserved_channel_ceiling))
        .with_max_connections(args.max_connections);
    let ready = bootstrap.validate_file(&args.config)?;

    if args.check {
        println!("{}", serde_json::to_string_pretty(ready.config().as_ref())?);
        return Ok(());
    }

    let shutdown = Shutdown::new();
    let signals = spawn_signal_listener(shutdown.clone());

    let mut stop = shutdown.subscribe();
    let daemon = ready.bind(&mut stop).await?;

    // Scrape port opens only after every daemon listener is bound.
    if let Some(addr) = args.metrics_address {
        observability::metrics::init_metrics(addr)?;
    }

    daemon.serve(&shutdown).await;

    signals.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
