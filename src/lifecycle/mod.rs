//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validating ─┬─▶ Ready ─▶ Binding ─┬─▶ Serving
//!                 └─▶ Rejected ◀────────┘
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown (or interrupt binding)
//! ```
//!
//! # Design Decisions
//! - Ordered startup: full validation, then message director, then roles
//! - No partial state: a rejected bootstrap holds no sockets and no tasks
//! - Shutdown has timeout: held connections are not waited on forever

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::spawn_signal_listener;
pub use startup::{Bootstrap, BootstrapError, BootstrapPhase, ReadyDaemon, ServingDaemon};
