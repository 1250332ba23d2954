//! Accept loop for one bound listener.
//!
//! Each accepted connection gets its own task which keeps the socket open,
//! discarding inbound bytes, until the peer hangs up or shutdown is
//! triggered.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::lifecycle::ShutdownSignal;
use crate::net::listener::ConnectionPermit;
use crate::net::{ConnectionGuard, ConnectionTracker, Listener, ListenerError};

/// Pause after a failed accept, e.g. when the process is out of descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

const READ_BUFFER_SIZE: usize = 4096;

/// Accept connections on `listener` until `shutdown` fires.
///
/// The listener is dropped (and its port released) when this returns.
pub async fn accept_loop(listener: Listener, tracker: ConnectionTracker, mut shutdown: ShutdownSignal) {
    let endpoint = listener.endpoint();
    tracing::info!(endpoint = %endpoint, address = %listener.local_addr(), "Accepting connections");

    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer, permit)) => {
                let guard = tracker.track(endpoint);
                tokio::spawn(hold_connection(stream, peer, guard, permit, shutdown.clone()));
            }
            Err(ListenerError::Closed) => break,
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }

    tracing::info!(endpoint = %endpoint, "Stopped accepting connections");
}

async fn hold_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
    mut shutdown: ShutdownSignal,
) {
    tracing::debug!(connection_id = %guard.id(), endpoint = %guard.endpoint(), peer_addr = %peer, "Connection held");
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            read = stream.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => tracing::trace!(connection_id = %guard.id(), bytes = n, "Discarded inbound data"),
                Err(e) => {
                    tracing::debug!(connection_id = %guard.id(), error = %e, "Connection read failed");
                    break;
                }
            },
        }
    }
}
