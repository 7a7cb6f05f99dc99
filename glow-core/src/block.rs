//! Proposed blocks.
//!
//! The core never builds block contents. A block here is the identity of a
//! leader's proposal for a slot, handed over by the block builder and
//! immutable once proposed.

use serde::{Deserialize, Serialize};

use crate::hash::hash_all;
use crate::types::{BlockId, Slot, ValidatorId};

/// A proposal for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    /// Block identifier.
    pub id: BlockId,
    /// Slot the block is proposed for.
    pub slot: Slot,
    /// Validator that proposed it.
    pub proposer: ValidatorId,
}

impl Block {
    /// Create a block with an id computed by the caller.
    pub fn new(id: BlockId, slot: Slot, proposer: ValidatorId) -> Self {
        Self { id, slot, proposer }
    }

    /// Create a block whose id commits to the slot, proposer and payload.
    pub fn from_payload(slot: Slot, proposer: ValidatorId, payload: &[u8]) -> Self {
        let id = BlockId(hash_all(&[
            slot.0.to_le_bytes().as_slice(),
            proposer.0.to_le_bytes().as_slice(),
            payload,
        ]));
        Self { id, slot, proposer }
    }
}
