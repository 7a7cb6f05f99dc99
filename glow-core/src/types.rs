//! Identifiers shared across the protocol.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::{hash, Hash};
use crate::params::{FALLBACK_QUORUM_PCT, FAST_QUORUM_PCT};

/// Identifier of a validator within one epoch's stake table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValidatorId(pub u32);

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A position in the chain for which at most one block may be finalized.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Slot(pub u64);

impl Slot {
    /// The first slot of an epoch.
    pub const GENESIS: Self = Self(0);

    /// The slot after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Raw slot number.
    pub fn number(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// Voting round within a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Round {
    /// Notarization round targeting the fast quorum.
    Round1,
    /// Finalization round targeting the fallback quorum.
    Round2,
}

impl Round {
    /// Round number (1 or 2).
    pub fn number(self) -> u8 {
        match self {
            Round::Round1 => 1,
            Round::Round2 => 2,
        }
    }

    /// Stake percentage a certificate for this round must carry.
    pub fn quorum_pct(self) -> u64 {
        match self {
            Round::Round1 => FAST_QUORUM_PCT,
            Round::Round2 => FALLBACK_QUORUM_PCT,
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round {}", self.number())
    }
}

/// Identifier of a proposed block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub Hash);

impl BlockId {
    /// Derive an id from the proposal payload supplied by the block builder.
    pub fn digest(payload: &[u8]) -> Self {
        Self(hash(payload))
    }

    /// Underlying hash.
    pub fn hash(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", &self.0.to_hex()[..16])
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_hex()[..16])
    }
}
