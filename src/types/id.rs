//! Identifier types for runtime entities.
//!
//! Shards are addressed by a dense index in `0..shard_count`. The index is
//! the only thing a shard identifier carries; which runtime it belongs to is
//! implied by the dispatcher it is handed to.

use core::fmt;

/// Identifier of one shard (execution context) in a shard runtime.
///
/// Shards form a fixed, dense set `0..shard_count` decided when the runtime
/// is built.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId(u16);

impl ShardId {
    /// The first shard. Every runtime has at least one.
    pub const ZERO: Self = Self(0);

    /// Creates a shard ID from its index.
    #[must_use]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Creates a shard ID from a `usize` index, if it fits.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        u16::try_from(index).ok().map(Self)
    }

    /// Returns the dense index of this shard.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Iterates over every shard of a runtime with `count` shards.
    ///
    /// Indices beyond `u16::MAX` are not representable and are skipped.
    pub fn all(count: usize) -> impl Iterator<Item = Self> {
        (0..count).filter_map(Self::from_index)
    }
}

impl fmt::Debug for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShardId({})", self.0)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard-{}", self.0)
    }
}

impl From<u16> for ShardId {
    fn from(index: u16) -> Self {
        Self(index)
    }
}
