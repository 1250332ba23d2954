//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate the whole configuration before any side effect
//! - Bind the message director, then each role's listener, in order
//! - Release everything already bound if a later step fails
//! - Hand the bound listeners to the accept loops
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Each phase is its own type (`Bootstrap` → `ReadyDaemon` →
//!   `ServingDaemon`), so a daemon cannot serve without having validated and
//!   bound
//! - Rollback is ownership: listeners live in a `BindingTransaction` until
//!   commit, and dropping it closes them in reverse order

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::config::{load_config, parse_config, BindAddress, ChannelPolicy, ConfigError, GlobalConfig};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::net::{accept_loop, ConnectionTracker, Endpoint, Listener, ListenerError};
use crate::observability::logging::error_chain;
use crate::observability::metrics;
use crate::routing::{ChannelMap, RoleId};

/// Default per-listener connection limit.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Upper bound on waiting for held connections after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BootstrapPhase {
    Validating,
    Ready,
    Binding,
    Serving,
    Rejected,
}

impl BootstrapPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapPhase::Validating => "validating",
            BootstrapPhase::Ready => "ready",
            BootstrapPhase::Binding => "binding",
            BootstrapPhase::Serving => "serving",
            BootstrapPhase::Rejected => "rejected",
        }
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the daemon did not reach `Serving`.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not bind {endpoint} on {address}")]
    Bind {
        endpoint: Endpoint,
        address: BindAddress,
        #[source]
        source: ListenerError,
    },

    #[error("bootstrap interrupted while {phase}")]
    Interrupted { phase: BootstrapPhase },
}

impl BootstrapError {
    /// The phase that failed.
    pub fn phase(&self) -> BootstrapPhase {
        match self {
            BootstrapError::Config(_) => BootstrapPhase::Validating,
            BootstrapError::Bind { .. } => BootstrapPhase::Binding,
            BootstrapError::Interrupted { phase } => *phase,
        }
    }
}

/// Entry point of the bootstrap.
#[derive(Debug, Clone, Default)]
pub struct Bootstrap {
    policy: ChannelPolicy,
    max_connections: Option<usize>,
}

impl Bootstrap {
    pub fn new(policy: ChannelPolicy) -> Self {
        Self {
            policy,
            max_connections: None,
        }
    }

    /// Per-listener connection limit, [`DEFAULT_MAX_CONNECTIONS`] if unset.
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    pub fn policy(&self) -> &ChannelPolicy {
        &self.policy
    }

    /// Validate configuration text.
    pub fn validate(&self, source: &str) -> Result<ReadyDaemon, BootstrapError> {
        tracing::info!(phase = %BootstrapPhase::Validating, "Validating configuration");
        self.ready(parse_config(source, &self.policy))
    }

    /// Validate the configuration file at `path`.
    pub fn validate_file(&self, path: &Path) -> Result<ReadyDaemon, BootstrapError> {
        tracing::info!(phase = %BootstrapPhase::Validating, path = %path.display(), "Validating configuration");
        self.ready(load_config(path, &self.policy))
    }

    fn ready(&self, loaded: Result<GlobalConfig, ConfigError>) -> Result<ReadyDaemon, BootstrapError> {
        let config = match loaded {
            Ok(config) => config,
            Err(e) => {
                report_config_error(&e);
                return Err(reject(e.into()));
            }
        };

        tracing::info!(
            phase = %BootstrapPhase::Ready,
            roles = config.roles.len(),
            uberdogs = config.uberdogs.len(),
            channel_allocations = config.channels.len(),
            "Configuration accepted"
        );
        metrics::record_bootstrap(BootstrapPhase::Validating, true);

        Ok(ReadyDaemon {
            config: Arc::new(config),
            max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
        })
    }
}

fn report_config_error(error: &ConfigError) {
    let errors = error.validation_errors();
    if errors.is_empty() {
        tracing::error!(error = %error_chain(error), "Configuration could not be loaded");
        return;
    }

    for e in errors {
        tracing::error!(path = %e.path(), kind = e.kind(), "{e}");
    }
    tracing::error!(errors = errors.len(), "Configuration rejected");
    metrics::record_validation_errors(errors);
}

fn reject(error: BootstrapError) -> BootstrapError {
    let phase = error.phase();
    tracing::error!(phase = %phase, next = %BootstrapPhase::Rejected, "Bootstrap failed");
    metrics::record_bootstrap(phase, false);
    error
}

/// A daemon whose configuration validated. Nothing is bound yet.
#[derive(Debug)]
pub struct ReadyDaemon {
    config: Arc<GlobalConfig>,
    max_connections: usize,
}

impl ReadyDaemon {
    pub fn config(&self) -> &Arc<GlobalConfig> {
        &self.config
    }

    /// Sockets to bind, in order: message director first, then roles as declared.
    pub fn binding_plan(&self) -> Vec<(Endpoint, BindAddress)> {
        let roles = self
            .config
            .roles
            .iter()
            .enumerate()
            .filter_map(|(index, role)| Some((Endpoint::Role(RoleId(index)), role.bind_address()?)));

        std::iter::once((Endpoint::MessageDirector, self.config.messagedirector.bind))
            .chain(roles)
            .collect()
    }

    /// Bind every listener of the plan, all or nothing.
    ///
    /// If `shutdown` fires or any bind fails, listeners bound so far are
    /// released before the error is returned.
    pub async fn bind(self, shutdown: &mut ShutdownSignal) -> Result<ServingDaemon, BootstrapError> {
        tracing::info!(phase = %BootstrapPhase::Binding, "Binding listeners");

        let listeners = self.bind_all(shutdown).await.map_err(reject)?;

        for (index, role) in self.config.roles.iter().enumerate() {
            let owner = RoleId(index);
            let channels: Vec<String> = self.config.channels.ranges_of(owner).map(|r| r.to_string()).collect();
            tracing::info!(
                role = %owner,
                role_type = role.role_type(),
                channels = ?channels,
                "Role registered"
            );
        }

        tracing::info!(phase = %BootstrapPhase::Serving, listeners = listeners.len(), "Bootstrap complete");
        metrics::record_bootstrap(BootstrapPhase::Binding, true);

        Ok(ServingDaemon {
            config: self.config,
            listeners,
            tracker: ConnectionTracker::new(),
        })
    }

    async fn bind_all(&self, shutdown: &mut ShutdownSignal) -> Result<Vec<Listener>, BootstrapError> {
        let mut transaction = BindingTransaction::default();

        for (endpoint, address) in self.binding_plan() {
            let bound = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::warn!(endpoint = %endpoint, "Stop requested during binding");
                    return Err(BootstrapError::Interrupted { phase: BootstrapPhase::Binding });
                }
                bound = Listener::bind(endpoint, address, self.max_connections) => bound,
            };

            match bound {
                Ok(listener) => transaction.push(listener),
                Err(source) => {
                    tracing::error!(endpoint = %endpoint, address = %address, error = %error_chain(&source), "Bind failed");
                    return Err(BootstrapError::Bind {
                        endpoint,
                        address,
                        source,
                    });
                }
            }
        }

        Ok(transaction.commit())
    }
}

/// Listeners bound so far in the current binding phase.
///
/// Dropping an uncommitted transaction releases them newest first.
#[derive(Debug, Default)]
struct BindingTransaction {
    listeners: Vec<Listener>,
}

impl BindingTransaction {
    fn push(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    fn commit(mut self) -> Vec<Listener> {
        std::mem::take(&mut self.listeners)
    }
}

impl Drop for BindingTransaction {
    fn drop(&mut self) {
        while let Some(listener) = self.listeners.pop() {
            tracing::warn!(
                endpoint = %listener.endpoint(),
                address = %listener.local_addr(),
                "Rolling back listener"
            );
        }
    }
}

/// A fully bound daemon.
#[derive(Debug)]
pub struct ServingDaemon {
    config: Arc<GlobalConfig>,
    listeners: Vec<Listener>,
    tracker: ConnectionTracker,
}

impl ServingDaemon {
    pub fn config(&self) -> &Arc<GlobalConfig> {
        &self.config
    }

    pub fn channel_map(&self) -> &ChannelMap {
        &self.config.channels
    }

    /// Address actually bound for `endpoint`.
    pub fn local_addr(&self, endpoint: Endpoint) -> Option<SocketAddr> {
        self.listeners
            .iter()
            .find(|l| l.endpoint() == endpoint)
            .map(Listener::local_addr)
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Run one accept loop per listener until `shutdown` fires, then drain.
    pub async fn serve(self, shutdown: &Shutdown) {
        let mut loops = JoinSet::new();
        for listener in self.listeners {
            loops.spawn(accept_loop(listener, self.tracker.clone(), shutdown.subscribe()));
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Accept loop failed");
                shutdown.trigger();
            }
        }

        if self.tracker.wait_idle(DRAIN_TIMEOUT).await {
            tracing::info!("All connections closed");
        } else {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "Connections still open after drain timeout"
            );
        }
    }
}
