//! Rejected-input taxonomy.
//!
//! Every per-message problem is a [`Rejection`]: the engine reports it and
//! keeps running. Nothing an adversary sends within the fault bound can turn
//! into a panic. Internal invariant violations are a different matter and
//! are asserted inside the engine.

use std::fmt;

use glow_core::{BlockId, CertificateError, LedgerConflict, Round, Slot, ValidatorId};
use serde::{Deserialize, Serialize};

/// Why a proposal was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalFault {
    /// Proposer is not the slot's assigned leader.
    WrongLeader {
        /// The assigned leader.
        expected: ValidatorId,
    },
    /// A different block was already recorded for the slot.
    AlreadyProposed {
        /// The recorded block.
        existing: BlockId,
    },
    /// The slot deadline passed before the proposal arrived.
    SlotExpired,
    /// The local engine is not the leader (or is an observer).
    NotLocalLeader,
}

impl fmt::Display for ProposalFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalFault::WrongLeader { expected } => write!(f, "leader is {}", expected),
            ProposalFault::AlreadyProposed { existing } => {
                write!(f, "block {} already proposed", existing)
            }
            ProposalFault::SlotExpired => write!(f, "slot expired"),
            ProposalFault::NotLocalLeader => write!(f, "local validator is not the leader"),
        }
    }
}

/// Why a skip vote was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipFault {
    /// The slot deadline has not passed yet.
    NotTimedOut,
    /// The voter already received a block for the slot.
    BlockReceived,
}

impl fmt::Display for SkipFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipFault::NotTimedOut => write!(f, "slot has not timed out"),
            SkipFault::BlockReceived => write!(f, "voter received a block"),
        }
    }
}

/// Coarse categories used for metrics and log routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Wrong slot or wrong leader.
    InvalidProposal,
    /// Second vote by a validator in the same round.
    DuplicateOrConflictingVote,
    /// Vote before the voter reconstructed the block.
    InsufficientReconstruction,
    /// Message for a past slot or round.
    StaleMessage,
    /// Message that is valid but not for the current phase.
    OutOfPhase,
    /// Message that is malformed for this stake table.
    InvalidInput,
    /// Certificate that does not verify or contradicts the ledger.
    InvalidCertificate,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionKind::InvalidProposal => write!(f, "invalid_proposal"),
            RejectionKind::DuplicateOrConflictingVote => write!(f, "duplicate_or_conflicting_vote"),
            RejectionKind::InsufficientReconstruction => write!(f, "insufficient_reconstruction"),
            RejectionKind::StaleMessage => write!(f, "stale_message"),
            RejectionKind::OutOfPhase => write!(f, "out_of_phase"),
            RejectionKind::InvalidInput => write!(f, "invalid_input"),
            RejectionKind::InvalidCertificate => write!(f, "invalid_certificate"),
        }
    }
}

/// A refused input. Non-fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("invalid proposal for {slot} from {proposer}: {fault}")]
    InvalidProposal {
        slot: Slot,
        proposer: ValidatorId,
        fault: ProposalFault,
    },

    #[error("{validator} already voted {recorded} in {slot} {round}, refused {attempted}")]
    DuplicateOrConflictingVote {
        validator: ValidatorId,
        slot: Slot,
        round: Round,
        recorded: BlockId,
        attempted: BlockId,
    },

    #[error("{validator} holds {units} of {required} units for {block}")]
    InsufficientReconstruction {
        validator: ValidatorId,
        block: BlockId,
        units: u64,
        required: u64,
    },

    #[error("stale message for {slot} (current {current})")]
    StaleMessage { slot: Slot, current: Slot },

    #[error("stale {got} message in {slot} (current {current})")]
    StaleRound { slot: Slot, current: Round, got: Round },

    #[error("wrong round in {slot}: expected {expected}, got {got}")]
    WrongRound {
        slot: Slot,
        expected: Round,
        got: Round,
    },

    #[error("message for {slot} is too far ahead of {current}")]
    FutureSlot { slot: Slot, current: Slot },

    #[error("voting not open yet in {slot}")]
    VotingNotOpen { slot: Slot },

    #[error("voting closed in {slot}")]
    VotingClosed { slot: Slot },

    #[error("unknown validator: {0}")]
    UnknownValidator(ValidatorId),

    #[error("invalid unit {unit} for {block}: {reason}")]
    InvalidUnit {
        block: BlockId,
        unit: u32,
        reason: String,
    },

    #[error("skip vote by {validator} for {slot} refused: {fault}")]
    SkipNotAllowed {
        validator: ValidatorId,
        slot: Slot,
        fault: SkipFault,
    },

    #[error("{validator} already cast a skip vote for {slot}")]
    DuplicateSkipVote { validator: ValidatorId, slot: Slot },

    #[error("invalid certificate for {slot}: {source}")]
    InvalidCertificate {
        slot: Slot,
        #[source]
        source: CertificateError,
    },

    #[error("certificate contradicts ledger: {0}")]
    ConflictingCertificate(LedgerConflict),
}

impl Rejection {
    /// Category of this rejection.
    pub fn kind(&self) -> RejectionKind {
        match self {
            Rejection::InvalidProposal { .. } => RejectionKind::InvalidProposal,
            Rejection::DuplicateOrConflictingVote { .. } | Rejection::DuplicateSkipVote { .. } => {
                RejectionKind::DuplicateOrConflictingVote
            }
            Rejection::InsufficientReconstruction { .. } => {
                RejectionKind::InsufficientReconstruction
            }
            Rejection::StaleMessage { .. } | Rejection::StaleRound { .. } => {
                RejectionKind::StaleMessage
            }
            Rejection::WrongRound { .. }
            | Rejection::FutureSlot { .. }
            | Rejection::VotingNotOpen { .. }
            | Rejection::VotingClosed { .. }
            | Rejection::SkipNotAllowed { .. } => RejectionKind::OutOfPhase,
            Rejection::UnknownValidator(_) | Rejection::InvalidUnit { .. } => {
                RejectionKind::InvalidInput
            }
            Rejection::InvalidCertificate { .. } | Rejection::ConflictingCertificate(_) => {
                RejectionKind::InvalidCertificate
            }
        }
    }

    /// Whether the input proves a validator broke protocol rules, as opposed
    /// to arriving late, early, or twice.
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            Rejection::InvalidProposal { fault, .. } => matches!(
                fault,
                ProposalFault::WrongLeader { .. } | ProposalFault::AlreadyProposed { .. }
            ),
            Rejection::DuplicateOrConflictingVote {
                recorded,
                attempted,
                ..
            } => recorded != attempted,
            Rejection::SkipNotAllowed { fault, .. } => *fault == SkipFault::BlockReceived,
            Rejection::InvalidCertificate { .. } | Rejection::ConflictingCertificate(_) => true,
            _ => false,
        }
    }

    /// Whether the same input may be accepted later without any change to
    /// the input itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Rejection::InsufficientReconstruction { .. }
                | Rejection::WrongRound { .. }
                | Rejection::VotingNotOpen { .. }
                | Rejection::SkipNotAllowed {
                    fault: SkipFault::NotTimedOut,
                    ..
                }
        )
    }
}
