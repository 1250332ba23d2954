//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Validated bind address
//!     → listener.rs (bind, connection limit)
//!     → acceptor.rs (accept loop per listener, stop on shutdown)
//!     → connection.rs (lifecycle tracking, drain on shutdown)
//!
//! Connection States:
//!     Accepted → Held → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Wire protocol handling lives elsewhere; accepted connections are only
//!   held open until the peer or the daemon goes away

pub mod acceptor;
pub mod connection;
pub mod listener;

pub use acceptor::accept_loop;
pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{Endpoint, Listener, ListenerError};
