//! Channel allocation table.
//!
//! # Responsibilities
//! - Record which role owns each channel range
//! - Refuse allocations that overlap an existing one
//! - Look up the owner of a channel
//!
//! # Design Decisions
//! - Keyed by range start in a `BTreeMap`; since stored ranges never overlap,
//!   the only candidate for any channel is the range with the greatest start
//!   at or below it
//! - Immutable after validation, shared read-only with the runtime

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::config::schema::ChannelRange;

/// Index of a role in the configuration's `roles` sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RoleId(pub usize);

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "roles[{}]", self.0)
    }
}

/// A channel range and the role that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub range: ChannelRange,
    pub owner: RoleId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("channels {requested} overlap channels {} already owned by {}", .existing.range, .existing.owner)]
pub struct AllocationConflict {
    pub requested: ChannelRange,
    pub existing: Allocation,
}

/// Non-overlapping channel allocations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMap {
    by_start: BTreeMap<u64, Allocation>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `range` to `owner`, unless part of it is already taken.
    pub fn allocate(&mut self, range: ChannelRange, owner: RoleId) -> Result<(), AllocationConflict> {
        if let Some(existing) = self.candidate(range.max()) {
            if existing.range.overlaps(&range) {
                return Err(AllocationConflict {
                    requested: range,
                    existing: *existing,
                });
            }
        }

        self.by_start.insert(range.min(), Allocation { range, owner });
        Ok(())
    }

    /// The role owning `channel`, if any.
    pub fn owner_of(&self, channel: u64) -> Option<RoleId> {
        self.candidate(channel)
            .filter(|a| a.range.contains(channel))
            .map(|a| a.owner)
    }

    /// Allocations in ascending channel order.
    pub fn allocations(&self) -> impl Iterator<Item = &Allocation> {
        self.by_start.values()
    }

    /// All ranges owned by `owner`.
    pub fn ranges_of(&self, owner: RoleId) -> impl Iterator<Item = ChannelRange> + '_ {
        self.allocations()
            .filter(move |a| a.owner == owner)
            .map(|a| a.range)
    }

    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }

    fn candidate(&self, channel: u64) -> Option<&Allocation> {
        self.by_start.range(..=channel).next_back().map(|(_, a)| a)
    }
}

impl Serialize for ChannelMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.allocations())
    }
}
