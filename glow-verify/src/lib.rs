//! Protocol verification for glow engines.
//!
//! Checks the safety invariants of the dual-path finalization protocol against
//! any engine that exposes its state through [`ProtocolState`]. The engine
//! runs these checks as internal assertions; test harnesses run them after
//! every delivered event and across engines with [`agreement`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     VERIFICATION LAYER                        │
//! │                                                               │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │ STATE INVARIANTS (one engine, one snapshot)             │  │
//! │  │  - at most one finalized block per slot                 │  │
//! │  │  - certificates carry their threshold of stake          │  │
//! │  │  - one vote per validator per round                     │  │
//! │  │  - votes only after reconstruction                      │  │
//! │  │  - finalize and skip are exclusive                      │  │
//! │  │  - round 2 only after the round-1 deadline              │  │
//! │  └─────────────────────────────────────────────────────────┘  │
//! │                                                               │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │ TRANSITION INVARIANTS (one engine, before/after)        │  │
//! │  │  - ledger is append-only                                │  │
//! │  │  - reconstruction never regresses                       │  │
//! │  │  - slots never go backwards                             │  │
//! │  └─────────────────────────────────────────────────────────┘  │
//! │                                                               │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │ AGREEMENT (many engines)                                │  │
//! │  │  - no two ledgers disagree on any slot                  │  │
//! │  └─────────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use glow_verify::{verify_state, ProtocolInvariants};
//!
//! let invariants = ProtocolInvariants::all();
//! verify_state(&engine, &invariants)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod agreement;
pub mod invariants;

use glow_core::{
    BlockId, Certificate, FinalizedLedger, QuorumCalculator, Round, Slot, ValidatorId, Vote,
};
use serde::{Deserialize, Serialize};

pub use agreement::{check_agreement, AgreementReport};
pub use invariants::{Invariant, InvariantViolation, ProtocolInvariants};

/// Verify a single state satisfies all enabled invariants.
pub fn verify_state<S>(state: &S, invariants: &ProtocolInvariants) -> Result<(), InvariantViolation>
where
    S: ProtocolState,
{
    invariants.check(state)
}

/// Verify a state transition satisfies all enabled invariants.
pub fn verify_transition<S>(
    old_state: &S,
    new_state: &S,
    invariants: &ProtocolInvariants,
) -> Result<(), InvariantViolation>
where
    S: ProtocolState,
{
    invariants.verify_transition(old_state, new_state)
}

/// A vote as it was accepted, with the voter's reconstruction progress at
/// acceptance time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// The accepted vote.
    pub vote: Vote,
    /// Distinct units the voter held for the block when the vote was accepted.
    pub units_at_acceptance: u64,
}

/// Reconstruction progress of one validator for one block in one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionRecord {
    /// Validator holding the units.
    pub validator: ValidatorId,
    /// Slot the units were announced for.
    pub slot: Slot,
    /// Block being reconstructed.
    pub block: BlockId,
    /// Distinct units accumulated.
    pub units: u64,
    /// Whether the block counts as received.
    pub received: bool,
}

/// Round progression of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Slot the record describes.
    pub slot: Slot,
    /// Logical deadline of round 1.
    pub round1_deadline: u64,
    /// Tick at which round 2 was entered, if it was.
    pub round2_entered_at: Option<u64>,
    /// Whether a round-1 fast quorum existed when round 2 was entered.
    pub fast_quorum_at_round2: bool,
}

/// Read access to the parts of an engine the invariants inspect.
pub trait ProtocolState {
    /// Stake table and thresholds.
    fn quorum(&self) -> &QuorumCalculator;

    /// The finalized ledger view.
    fn ledger(&self) -> &FinalizedLedger;

    /// Slot currently being decided.
    fn current_slot(&self) -> Slot;

    /// Round of the current slot.
    fn current_round(&self) -> Round;

    /// Units a validator must hold for a block to count as received.
    fn reconstruction_threshold(&self) -> u64;

    /// Every accepted round-1 and round-2 vote.
    fn accepted_votes(&self) -> Vec<VoteRecord>;

    /// Every (validator, slot, block) reconstruction state.
    fn reconstruction_states(&self) -> Vec<ReconstructionRecord>;

    /// Round progression of every slot started so far.
    fn round_records(&self) -> Vec<RoundRecord>;

    /// Every certificate formed locally or adopted from the network.
    fn certificates(&self) -> Vec<Certificate>;

    /// Ticks are logical; the latest one the engine has observed.
    fn now(&self) -> u64;
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::agreement::{check_agreement, AgreementReport};
    pub use crate::invariants::{Invariant, InvariantViolation, ProtocolInvariants};
    pub use crate::{verify_state, verify_transition, ProtocolState};
}
