//! Channel routing subsystem.
//!
//! # Data Flow
//! ```text
//! Validated roles (declaration order)
//!     → channel_map.rs (allocate each role's channels, reject overlaps)
//!     → ChannelMap frozen inside GlobalConfig
//!
//! At runtime:
//!     datagram addressed to channel N
//!     → ChannelMap::owner_of(N)
//!     → owning role, or no owner
//! ```
//!
//! # Design Decisions
//! - Allocation happens during validation, so an overlap rejects startup
//! - Immutable after construction (thread-safe without locks)
//! - Deterministic: same config always yields the same map

pub mod channel_map;

pub use channel_map::{Allocation, AllocationConflict, ChannelMap, RoleId};
