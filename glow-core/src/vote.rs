//! Finalization and skip votes.
//!
//! Votes are plain records; signatures are attached and checked by the
//! transport layer before a vote reaches the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{BlockId, Round, Slot, ValidatorId};

/// A round-1 or round-2 vote for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vote {
    /// Voting validator.
    pub validator: ValidatorId,
    /// Block voted for.
    pub block: BlockId,
    /// Slot of the block.
    pub slot: Slot,
    /// Round the vote belongs to.
    pub round: Round,
}

impl Vote {
    /// Create a vote.
    pub fn new(validator: ValidatorId, block: BlockId, slot: Slot, round: Round) -> Self {
        Self {
            validator,
            block,
            slot,
            round,
        }
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} vote by {} for {}",
            self.slot, self.round, self.validator, self.block
        )
    }
}

/// A vote to skip a slot that produced no received block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkipVote {
    /// Voting validator.
    pub validator: ValidatorId,
    /// Slot to skip.
    pub slot: Slot,
}

impl SkipVote {
    /// Create a skip vote.
    pub fn new(validator: ValidatorId, slot: Slot) -> Self {
        Self { validator, slot }
    }
}

impl fmt::Display for SkipVote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} skip vote by {}", self.slot, self.validator)
    }
}
