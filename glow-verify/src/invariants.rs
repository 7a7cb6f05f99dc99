//! Protocol invariants.

use std::collections::{BTreeMap, HashMap};

use glow_core::{BlockId, Certificate, Outcome, Round, Slot, ValidatorId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ProtocolState;

/// An invariant that must hold for every reachable engine state.
pub trait Invariant<S> {
    /// Name of this invariant.
    fn name(&self) -> &str;

    /// Check if the invariant holds for a state.
    fn check(&self, state: &S) -> Result<(), InvariantViolation>;

    /// Check if the invariant holds across a transition.
    fn check_transition(&self, _old: &S, _new: &S) -> Result<(), InvariantViolation> {
        Ok(())
    }
}

/// Violation of an invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("invariant '{name}' violated: {message}")]
pub struct InvariantViolation {
    /// Invariant name.
    pub name: String,
    /// Violation message.
    pub message: String,
    /// Slot the violation concerns (if any).
    pub slot: Option<Slot>,
}

impl InvariantViolation {
    /// Create a new violation.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            slot: None,
        }
    }

    /// Add slot context.
    pub fn at_slot(mut self, slot: Slot) -> Self {
        self.slot = Some(slot);
        self
    }
}

/// Invariant: no slot has two different finalized blocks.
#[derive(Debug, Clone, Copy)]
pub struct NoConflictingFinalization;

impl<S: ProtocolState> Invariant<S> for NoConflictingFinalization {
    fn name(&self) -> &str {
        "no_conflicting_finalization"
    }

    fn check(&self, state: &S) -> Result<(), InvariantViolation> {
        let mut finalized: BTreeMap<Slot, BlockId> = BTreeMap::new();
        for (slot, entry) in state.ledger().iter() {
            if entry.slot() != *slot {
                return Err(InvariantViolation::new(
                    "no_conflicting_finalization",
                    format!("ledger key {} holds an entry for {}", slot, entry.slot()),
                )
                .at_slot(*slot));
            }
            if let Outcome::Finalized(block) = entry.outcome() {
                finalized.insert(*slot, block);
            }
        }
        for cert in state.certificates() {
            let Certificate::Quorum(qc) = cert else {
                continue;
            };
            let recorded = *finalized.entry(qc.slot).or_insert(qc.block);
            if recorded != qc.block {
                return Err(InvariantViolation::new(
                    "no_conflicting_finalization",
                    format!("blocks {} and {} both finalized", recorded, qc.block),
                )
                .at_slot(qc.slot));
            }
        }
        Ok(())
    }
}

/// Invariant: every certificate carries its round's share of stake
/// (80% round 1, 60% round 2, 60% skip).
#[derive(Debug, Clone, Copy)]
pub struct CertificateThreshold;

impl<S: ProtocolState> Invariant<S> for CertificateThreshold {
    fn name(&self) -> &str {
        "certificate_threshold"
    }

    fn check(&self, state: &S) -> Result<(), InvariantViolation> {
        let quorum = state.quorum();
        let from_ledger = state.ledger().iter().map(|(_, entry)| match entry {
            glow_core::LedgerEntry::Finalized(qc) => Certificate::Quorum(qc.clone()),
            glow_core::LedgerEntry::Skipped(sc) => Certificate::Skip(sc.clone()),
        });
        for cert in state.certificates().into_iter().chain(from_ledger) {
            if let Err(err) = cert.verify(quorum) {
                return Err(InvariantViolation::new("certificate_threshold", err.to_string())
                    .at_slot(cert.slot()));
            }
        }
        Ok(())
    }
}

/// Invariant: at most one accepted vote per validator, slot and round.
#[derive(Debug, Clone, Copy)]
pub struct SingleVotePerRound;

impl<S: ProtocolState> Invariant<S> for SingleVotePerRound {
    fn name(&self) -> &str {
        "single_vote_per_round"
    }

    fn check(&self, state: &S) -> Result<(), InvariantViolation> {
        let mut seen: HashMap<(ValidatorId, Slot, Round), BlockId> = HashMap::new();
        for record in state.accepted_votes() {
            let v = record.vote;
            if let Some(previous) = seen.insert((v.validator, v.slot, v.round), v.block) {
                return Err(InvariantViolation::new(
                    "single_vote_per_round",
                    format!(
                        "{} has two {} votes ({} and {})",
                        v.validator, v.round, previous, v.block
                    ),
                )
                .at_slot(v.slot));
            }
        }
        Ok(())
    }
}

/// Invariant: a vote was accepted only once its voter held enough units.
#[derive(Debug, Clone, Copy)]
pub struct ReceiptBeforeVote;

impl<S: ProtocolState> Invariant<S> for ReceiptBeforeVote {
    fn name(&self) -> &str {
        "receipt_before_vote"
    }

    fn check(&self, state: &S) -> Result<(), InvariantViolation> {
        let required = state.reconstruction_threshold();
        for record in state.accepted_votes() {
            if record.units_at_acceptance < required {
                return Err(InvariantViolation::new(
                    "receipt_before_vote",
                    format!(
                        "{} accepted with {} of {} required units",
                        record.vote, record.units_at_acceptance, required
                    ),
                )
                .at_slot(record.vote.slot));
            }
        }
        Ok(())
    }
}

/// Invariant: "received" implies the unit threshold was crossed.
#[derive(Debug, Clone, Copy)]
pub struct ReceivedImpliesThreshold;

impl<S: ProtocolState> Invariant<S> for ReceivedImpliesThreshold {
    fn name(&self) -> &str {
        "received_implies_threshold"
    }

    fn check(&self, state: &S) -> Result<(), InvariantViolation> {
        let required = state.reconstruction_threshold();
        for record in state.reconstruction_states() {
            if record.received && record.units < required {
                return Err(InvariantViolation::new(
                    "received_implies_threshold",
                    format!(
                        "{} received {} with {} of {} units",
                        record.validator, record.block, record.units, required
                    ),
                )
                .at_slot(record.slot));
            }
        }
        Ok(())
    }
}

/// Invariant: no slot is both finalized and skipped.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeSkipExclusive;

impl<S: ProtocolState> Invariant<S> for FinalizeSkipExclusive {
    fn name(&self) -> &str {
        "finalize_skip_exclusive"
    }

    fn check(&self, state: &S) -> Result<(), InvariantViolation> {
        let mut kinds: BTreeMap<Slot, (bool, bool)> = BTreeMap::new();
        for cert in state.certificates() {
            let entry = kinds.entry(cert.slot()).or_default();
            match cert {
                Certificate::Quorum(_) => entry.0 = true,
                Certificate::Skip(_) => entry.1 = true,
            }
        }
        for (slot, outcome) in state.ledger().iter().map(|(s, e)| (*s, e.outcome())) {
            let entry = kinds.entry(slot).or_default();
            match outcome {
                Outcome::Finalized(_) => entry.0 = true,
                Outcome::Skipped => entry.1 = true,
            }
        }
        match kinds.into_iter().find(|(_, (f, s))| *f && *s) {
            Some((slot, _)) => Err(InvariantViolation::new(
                "finalize_skip_exclusive",
                "slot has both a finalization and a skip certificate",
            )
            .at_slot(slot)),
            None => Ok(()),
        }
    }
}

/// Invariant: round 2 is entered only after the round-1 deadline and only
/// without a fast quorum.
#[derive(Debug, Clone, Copy)]
pub struct RoundMonotonicity;

impl<S: ProtocolState> Invariant<S> for RoundMonotonicity {
    fn name(&self) -> &str {
        "round_monotonicity"
    }

    fn check(&self, state: &S) -> Result<(), InvariantViolation> {
        let records = state.round_records();
        for record in &records {
            let Some(entered) = record.round2_entered_at else {
                continue;
            };
            if entered < record.round1_deadline {
                return Err(InvariantViolation::new(
                    "round_monotonicity",
                    format!(
                        "round 2 entered at tick {} before round-1 deadline {}",
                        entered, record.round1_deadline
                    ),
                )
                .at_slot(record.slot));
            }
            if record.fast_quorum_at_round2 {
                return Err(InvariantViolation::new(
                    "round_monotonicity",
                    "round 2 entered although a fast quorum existed",
                )
                .at_slot(record.slot));
            }
        }
        if state.current_round() == Round::Round2 {
            let current = state.current_slot();
            let entered = records
                .iter()
                .any(|r| r.slot == current && r.round2_entered_at.is_some());
            if !entered {
                return Err(InvariantViolation::new(
                    "round_monotonicity",
                    "current round is 2 but no round-2 entry was recorded",
                )
                .at_slot(current));
            }
        }
        Ok(())
    }
}

/// Transition invariant: recorded ledger entries never change or disappear.
#[derive(Debug, Clone, Copy)]
pub struct AppendOnlyLedger;

impl<S: ProtocolState> Invariant<S> for AppendOnlyLedger {
    fn name(&self) -> &str {
        "append_only_ledger"
    }

    fn check(&self, _state: &S) -> Result<(), InvariantViolation> {
        Ok(())
    }

    fn check_transition(&self, old: &S, new: &S) -> Result<(), InvariantViolation> {
        for (slot, entry) in old.ledger().iter() {
            if new.ledger().get(*slot) != Some(entry) {
                return Err(InvariantViolation::new(
                    "append_only_ledger",
                    format!("entry {} was rewritten or removed", entry.outcome()),
                )
                .at_slot(*slot));
            }
        }
        Ok(())
    }
}

/// Transition invariant: reconstruction progress and the current slot only
/// move forward, and accepted votes are never retracted.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicProgress;

impl<S: ProtocolState> Invariant<S> for MonotonicProgress {
    fn name(&self) -> &str {
        "monotonic_progress"
    }

    fn check(&self, _state: &S) -> Result<(), InvariantViolation> {
        Ok(())
    }

    fn check_transition(&self, old: &S, new: &S) -> Result<(), InvariantViolation> {
        if new.current_slot() < old.current_slot() {
            return Err(InvariantViolation::new(
                "monotonic_progress",
                format!(
                    "slot went backwards: {} -> {}",
                    old.current_slot(),
                    new.current_slot()
                ),
            ));
        }

        let after: HashMap<(ValidatorId, Slot, BlockId), (u64, bool)> = new
            .reconstruction_states()
            .into_iter()
            .map(|r| ((r.validator, r.slot, r.block), (r.units, r.received)))
            .collect();
        for before in old.reconstruction_states() {
            let (units, received) = after
                .get(&(before.validator, before.slot, before.block))
                .copied()
                .unwrap_or((0, false));
            if units < before.units || (before.received && !received) {
                return Err(InvariantViolation::new(
                    "monotonic_progress",
                    format!(
                        "reconstruction of {} by {} regressed",
                        before.block, before.validator
                    ),
                )
                .at_slot(before.slot));
            }
        }

        let votes_after = new.accepted_votes();
        for record in old.accepted_votes() {
            if !votes_after.contains(&record) {
                return Err(InvariantViolation::new(
                    "monotonic_progress",
                    format!("{} was retracted", record.vote),
                )
                .at_slot(record.vote.slot));
            }
        }
        Ok(())
    }
}

/// Collection of protocol invariants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolInvariants {
    /// At most one finalized block per slot.
    pub no_conflicting_finalization: bool,
    /// Certificates meet their thresholds.
    pub certificate_threshold: bool,
    /// One vote per validator per round.
    pub single_vote_per_round: bool,
    /// Votes only after reconstruction.
    pub receipt_before_vote: bool,
    /// Received implies the unit threshold.
    pub received_implies_threshold: bool,
    /// Finalize and skip are exclusive.
    pub finalize_skip_exclusive: bool,
    /// Round 2 only after the round-1 deadline.
    pub round_monotonicity: bool,
    /// Ledger entries are never rewritten.
    pub append_only_ledger: bool,
    /// Slots, reconstruction and votes only move forward.
    pub monotonic_progress: bool,
}

impl ProtocolInvariants {
    /// Create a new invariant set with nothing enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with all invariants enabled.
    pub fn all() -> Self {
        Self {
            no_conflicting_finalization: true,
            certificate_threshold: true,
            single_vote_per_round: true,
            receipt_before_vote: true,
            received_implies_threshold: true,
            finalize_skip_exclusive: true,
            round_monotonicity: true,
            append_only_ledger: true,
            monotonic_progress: true,
        }
    }

    /// Require at most one finalized block per slot.
    pub fn require_no_conflicting_finalization(mut self) -> Self {
        self.no_conflicting_finalization = true;
        self
    }

    /// Require certificates to meet their thresholds.
    pub fn require_certificate_threshold(mut self) -> Self {
        self.certificate_threshold = true;
        self
    }

    /// Require one vote per validator per round.
    pub fn require_single_vote_per_round(mut self) -> Self {
        self.single_vote_per_round = true;
        self
    }

    /// Require votes to follow reconstruction.
    pub fn require_receipt_before_vote(mut self) -> Self {
        self.receipt_before_vote = true;
        self.received_implies_threshold = true;
        self
    }

    /// Require finalize and skip to be exclusive.
    pub fn require_finalize_skip_exclusive(mut self) -> Self {
        self.finalize_skip_exclusive = true;
        self
    }

    /// Require round monotonicity.
    pub fn require_round_monotonicity(mut self) -> Self {
        self.round_monotonicity = true;
        self
    }

    /// Require append-only ledger and forward-only progress across transitions.
    pub fn require_monotonic_transitions(mut self) -> Self {
        self.append_only_ledger = true;
        self.monotonic_progress = true;
        self
    }

    /// Check a single state.
    pub fn check<S: ProtocolState>(&self, state: &S) -> Result<(), InvariantViolation> {
        if self.no_conflicting_finalization {
            NoConflictingFinalization.check(state)?;
        }
        if self.certificate_threshold {
            CertificateThreshold.check(state)?;
        }
        if self.single_vote_per_round {
            SingleVotePerRound.check(state)?;
        }
        if self.receipt_before_vote {
            ReceiptBeforeVote.check(state)?;
        }
        if self.received_implies_threshold {
            ReceivedImpliesThreshold.check(state)?;
        }
        if self.finalize_skip_exclusive {
            FinalizeSkipExclusive.check(state)?;
        }
        if self.round_monotonicity {
            RoundMonotonicity.check(state)?;
        }
        Ok(())
    }

    /// Verify a state transition, including the new state itself.
    pub fn verify_transition<S: ProtocolState>(
        &self,
        old: &S,
        new: &S,
    ) -> Result<(), InvariantViolation> {
        self.check(new)?;
        if self.append_only_ledger {
            AppendOnlyLedger.check_transition(old, new)?;
        }
        if self.monotonic_progress {
            MonotonicProgress.check_transition(old, new)?;
        }
        Ok(())
    }
}
