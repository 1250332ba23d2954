//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind a validated address for one endpoint (message director or role)
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Log when the socket is released, including rollback

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::BindAddress;
use crate::observability::metrics;
use crate::routing::RoleId;

/// What a listener is bound for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Endpoint {
    MessageDirector,
    Role(RoleId),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::MessageDirector => f.write_str("messagedirector"),
            Endpoint::Role(id) => id.fmt(f),
        }
    }
}

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {address}")]
    Bind {
        address: SocketAddr,
        source: std::io::Error,
    },

    #[error("failed to accept: {0}")]
    Accept(std::io::Error),

    #[error("connection limit closed")]
    Closed,
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections wait until a slot becomes available.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    endpoint: Endpoint,
    local_addr: SocketAddr,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind `address` for `endpoint` with connection limits.
    pub async fn bind(endpoint: Endpoint, address: BindAddress, max_connections: usize) -> Result<Self, ListenerError> {
        let addr = address.socket_addr();
        let bind_error = |source| ListenerError::Bind { address: addr, source };

        let inner = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = inner.local_addr().map_err(bind_error)?;

        tracing::info!(
            endpoint = %endpoint,
            address = %local_addr,
            max_connections,
            "Listener bound"
        );
        metrics::listener_bound();

        Ok(Self {
            inner,
            endpoint,
            local_addr,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Returns the stream and a permit that must be held for the connection's
    /// lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = Arc::clone(&self.connection_limit)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, peer) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            endpoint = %self.endpoint,
            peer_addr = %peer,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, peer, ConnectionPermit { _permit: permit }))
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        metrics::listener_released();
        tracing::debug!(endpoint = %self.endpoint, address = %self.local_addr, "Listener released");
    }
}

/// A connection slot, returned to the listener when dropped.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}
