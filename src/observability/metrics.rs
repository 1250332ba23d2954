//! Metrics collection and exposition.
//!
//! # Metrics
//! - `astrond_validation_errors_total` (counter): diagnostics by kind
//! - `astrond_bootstrap_total` (counter): bootstrap outcome by phase
//! - `astrond_listeners_bound` (gauge): sockets currently bound
//! - `astrond_connections_accepted_total` (counter): by endpoint
//! - `astrond_active_connections` (gauge): by endpoint
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is only installed on request

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::config::ValidationError;
use crate::lifecycle::startup::BootstrapPhase;
use crate::net::Endpoint;

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("astrond_validation_errors_total", "Configuration defects found at startup");
    describe_counter!("astrond_bootstrap_total", "Bootstrap attempts by outcome");
    describe_gauge!("astrond_listeners_bound", "Sockets currently bound");
    describe_counter!("astrond_connections_accepted_total", "Connections accepted");
    describe_gauge!("astrond_active_connections", "Connections currently held");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_validation_errors(errors: &[ValidationError]) {
    for error in errors {
        counter!("astrond_validation_errors_total", "kind" => error.kind()).increment(1);
    }
}

pub fn record_bootstrap(phase: BootstrapPhase, success: bool) {
    let outcome = if success { "ok" } else { "rejected" };
    counter!("astrond_bootstrap_total", "phase" => phase.as_str(), "outcome" => outcome).increment(1);
}

pub fn listener_bound() {
    gauge!("astrond_listeners_bound").increment(1.0);
}

pub fn listener_released() {
    gauge!("astrond_listeners_bound").decrement(1.0);
}

pub fn connection_opened(endpoint: Endpoint) {
    let label = endpoint.to_string();
    counter!("astrond_connections_accepted_total", "endpoint" => label.clone()).increment(1);
    gauge!("astrond_active_connections", "endpoint" => label).increment(1.0);
}

pub fn connection_closed(endpoint: Endpoint) {
    gauge!("astrond_active_connections", "endpoint" => endpoint.to_string()).decrement(1.0);
}
