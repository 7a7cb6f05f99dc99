//! Wire messages.
//!
//! Encoded with bincode inside a versioned envelope. Signing and transport
//! are the network layer's concern; decoded messages are handed to the
//! engine as [`crate::Event::Message`].

use std::fmt;

use glow_core::params::PROTOCOL_VERSION;
use glow_core::{Block, BlockId, Certificate, Error, Result, SkipVote, Slot, ValidatorId, Vote};
use serde::{Deserialize, Serialize};

/// Announcement that `holder` has reconstruction unit `unit` of `block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitMessage {
    /// Validator holding the unit.
    pub holder: ValidatorId,
    /// Block the unit belongs to.
    pub block: BlockId,
    /// Slot of the block.
    pub slot: Slot,
    /// Unit index, `0..total_units`.
    pub unit: u32,
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMessage {
    /// Leader's block for a slot.
    Proposal(Block),
    /// Reconstruction unit announcement.
    Unit(UnitMessage),
    /// Round-1 or round-2 vote.
    Vote(Vote),
    /// Skip vote.
    SkipVote(SkipVote),
    /// Quorum or skip certificate.
    Certificate(Certificate),
}

impl ConsensusMessage {
    /// Slot the message refers to.
    pub fn slot(&self) -> Slot {
        match self {
            ConsensusMessage::Proposal(block) => block.slot,
            ConsensusMessage::Unit(unit) => unit.slot,
            ConsensusMessage::Vote(vote) => vote.slot,
            ConsensusMessage::SkipVote(vote) => vote.slot,
            ConsensusMessage::Certificate(cert) => cert.slot(),
        }
    }

    /// Short message type name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConsensusMessage::Proposal(_) => "proposal",
            ConsensusMessage::Unit(_) => "unit",
            ConsensusMessage::Vote(_) => "vote",
            ConsensusMessage::SkipVote(_) => "skip_vote",
            ConsensusMessage::Certificate(_) => "certificate",
        }
    }

    /// Encode for the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(&Envelope {
            version: PROTOCOL_VERSION,
            message: self.clone(),
        })
        .map_err(|e| Error::serialization(e.to_string()))
    }

    /// Decode from the wire.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let envelope: Envelope = bincode::deserialize(bytes)?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(Error::deserialization(format!(
                "unsupported protocol version {} (expected {})",
                envelope.version, PROTOCOL_VERSION
            )));
        }
        Ok(envelope.message)
    }
}

impl fmt::Display for ConsensusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {}", self.kind(), self.slot())
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u16,
    message: ConsensusMessage,
}
