//! Round-1 / round-2 vote collection for one slot.
//!
//! Handles:
//! - Accepting votes only in the slot's current round
//! - One vote per validator per round (conflicts kept as evidence)
//! - The reconstruction gate: no vote before the voter received the block
//! - Forming exactly one quorum certificate per slot

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use glow_core::{
    BlockId, QuorumCalculator, QuorumCertificate, Round, Slot, Threshold, ValidatorId, Vote,
    VoterSet,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dissemination::Disseminator;
use crate::rejection::Rejection;

/// Votor state machine.
///
/// `Idle → Round1Collecting → {FastFinalized | Round2Collecting}
///  → {FallbackFinalized | Unresolved}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotorPhase {
    /// Slot started, no block received yet.
    Idle,
    /// Accepting round-1 votes.
    Round1Collecting,
    /// Finalized by a round-1 fast quorum.
    FastFinalized,
    /// Accepting round-2 votes.
    Round2Collecting,
    /// Finalized by a round-2 fallback quorum.
    FallbackFinalized,
    /// Round 2 expired without a quorum; left to the skip path.
    Unresolved,
}

impl VotorPhase {
    /// Whether a certificate was formed.
    pub fn is_finalized(self) -> bool {
        matches!(self, VotorPhase::FastFinalized | VotorPhase::FallbackFinalized)
    }
}

impl fmt::Display for VotorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VotorPhase::Idle => write!(f, "idle"),
            VotorPhase::Round1Collecting => write!(f, "round1_collecting"),
            VotorPhase::FastFinalized => write!(f, "fast_finalized"),
            VotorPhase::Round2Collecting => write!(f, "round2_collecting"),
            VotorPhase::FallbackFinalized => write!(f, "fallback_finalized"),
            VotorPhase::Unresolved => write!(f, "unresolved"),
        }
    }
}

/// A recorded vote with the voter's reconstruction progress at acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedVote {
    /// The vote.
    pub vote: Vote,
    /// Units the voter held for the block when the vote was accepted.
    pub units_at_acceptance: u64,
}

/// Two votes by one validator for different blocks in the same round.
///
/// Penalizing the validator is left to the surrounding node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivocationEvidence {
    /// The first (recorded) vote.
    pub first: Vote,
    /// The refused vote.
    pub second: Vote,
}

impl EquivocationEvidence {
    /// The equivocating validator.
    pub fn validator(&self) -> ValidatorId {
        self.first.validator
    }
}

/// Vote statistics for a slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteStats {
    /// Accepted round-1 votes.
    pub round1_votes: usize,
    /// Accepted round-2 votes.
    pub round2_votes: usize,
    /// Distinct blocks that received votes.
    pub blocks: usize,
    /// Equivocations detected.
    pub conflicts: usize,
}

#[derive(Debug, Clone, Default)]
struct RoundVotes {
    by_validator: BTreeMap<ValidatorId, AcceptedVote>,
    by_block: HashMap<BlockId, VoterSet>,
}

impl RoundVotes {
    fn insert(&mut self, accepted: AcceptedVote) {
        let vote = accepted.vote;
        self.by_validator.insert(vote.validator, accepted);
        self.by_block
            .entry(vote.block)
            .or_default()
            .insert(vote.validator);
    }

    fn voters_for(&self, block: &BlockId) -> Option<&VoterSet> {
        self.by_block.get(block)
    }
}

/// Vote collection and certificate formation for one slot.
#[derive(Debug, Clone)]
pub struct Votor {
    slot: Slot,
    phase: VotorPhase,
    round1: RoundVotes,
    round2: RoundVotes,
    certificate: Option<QuorumCertificate>,
    evidence: Vec<EquivocationEvidence>,
}

impl Votor {
    /// Create an idle votor for `slot`.
    pub fn new(slot: Slot) -> Self {
        Self {
            slot,
            phase: VotorPhase::Idle,
            round1: RoundVotes::default(),
            round2: RoundVotes::default(),
            certificate: None,
            evidence: Vec::new(),
        }
    }

    /// Slot this votor collects for.
    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Current phase.
    pub fn phase(&self) -> VotorPhase {
        self.phase
    }

    /// Round currently accepting votes.
    pub fn collecting_round(&self) -> Option<Round> {
        match self.phase {
            VotorPhase::Round1Collecting => Some(Round::Round1),
            VotorPhase::Round2Collecting => Some(Round::Round2),
            _ => None,
        }
    }

    /// Open round 1. Returns false if not idle.
    pub fn start_round1(&mut self) -> bool {
        if self.phase != VotorPhase::Idle {
            return false;
        }
        self.phase = VotorPhase::Round1Collecting;
        debug!("{} votor collecting round 1", self.slot);
        true
    }

    /// Open round 2 after round 1 expired without a fast quorum.
    pub fn start_round2(&mut self) -> bool {
        if !matches!(self.phase, VotorPhase::Idle | VotorPhase::Round1Collecting) {
            return false;
        }
        self.phase = VotorPhase::Round2Collecting;
        debug!("{} votor collecting round 2", self.slot);
        true
    }

    /// Close round 2 without a certificate.
    pub fn mark_unresolved(&mut self) -> bool {
        if self.phase != VotorPhase::Round2Collecting {
            return false;
        }
        self.phase = VotorPhase::Unresolved;
        info!("{} unresolved after round 2", self.slot);
        true
    }

    /// Accept a vote, or say why not.
    ///
    /// Checks, in order: slot, round, one vote per validator per round, and
    /// that the voter already received the block.
    pub fn cast_vote(
        &mut self,
        vote: Vote,
        disseminator: &Disseminator,
    ) -> Result<AcceptedVote, Rejection> {
        if vote.slot < self.slot {
            return Err(Rejection::StaleMessage {
                slot: vote.slot,
                current: self.slot,
            });
        }
        if vote.slot > self.slot {
            return Err(Rejection::FutureSlot {
                slot: vote.slot,
                current: self.slot,
            });
        }

        let current = match self.phase {
            VotorPhase::Idle => return Err(Rejection::VotingNotOpen { slot: self.slot }),
            VotorPhase::Round1Collecting => Round::Round1,
            VotorPhase::Round2Collecting => Round::Round2,
            VotorPhase::FastFinalized
            | VotorPhase::FallbackFinalized
            | VotorPhase::Unresolved => return Err(Rejection::VotingClosed { slot: self.slot }),
        };
        if vote.round < current {
            return Err(Rejection::StaleRound {
                slot: self.slot,
                current,
                got: vote.round,
            });
        }
        if vote.round > current {
            return Err(Rejection::WrongRound {
                slot: self.slot,
                expected: current,
                got: vote.round,
            });
        }

        let votes = match vote.round {
            Round::Round1 => &self.round1,
            Round::Round2 => &self.round2,
        };
        if let Some(existing) = votes.by_validator.get(&vote.validator) {
            let recorded = existing.vote.block;
            if recorded != vote.block {
                warn!(
                    "Equivocation by {} in {} {}: {} vs {}",
                    vote.validator, self.slot, vote.round, recorded, vote.block
                );
                self.evidence.push(EquivocationEvidence {
                    first: existing.vote,
                    second: vote,
                });
            }
            return Err(Rejection::DuplicateOrConflictingVote {
                validator: vote.validator,
                slot: self.slot,
                round: vote.round,
                recorded,
                attempted: vote.block,
            });
        }

        if !disseminator.is_received(&vote.validator, vote.slot, &vote.block) {
            return Err(Rejection::InsufficientReconstruction {
                validator: vote.validator,
                block: vote.block,
                units: disseminator.units(&vote.validator, vote.slot, &vote.block),
                required: disseminator.threshold(),
            });
        }

        let accepted = AcceptedVote {
            vote,
            units_at_acceptance: disseminator.units(&vote.validator, vote.slot, &vote.block),
        };
        match vote.round {
            Round::Round1 => self.round1.insert(accepted),
            Round::Round2 => self.round2.insert(accepted),
        }
        debug!("Accepted {}", vote);
        Ok(accepted)
    }

    /// Form the certificate for `block` in `round` if its quorum is met.
    ///
    /// Idempotent: once a certificate exists the same certificate is returned
    /// for its block, and `None` for any other block.
    pub fn check_quorum(
        &mut self,
        block: &BlockId,
        round: Round,
        quorum: &QuorumCalculator,
    ) -> Option<QuorumCertificate> {
        if let Some(cert) = &self.certificate {
            return (cert.block == *block).then(|| cert.clone());
        }
        if self.collecting_round() != Some(round) {
            return None;
        }
        let votes = match round {
            Round::Round1 => &self.round1,
            Round::Round2 => &self.round2,
        };
        let voters = votes.voters_for(block)?;
        if !quorum.meets_quorum(voters, Threshold::for_round(round)) {
            return None;
        }

        let cert = QuorumCertificate::new(*block, self.slot, round, voters.clone(), quorum);
        self.phase = match round {
            Round::Round1 => VotorPhase::FastFinalized,
            Round::Round2 => VotorPhase::FallbackFinalized,
        };
        info!(
            "{} quorum for {} in {}: stake {}/{}",
            Threshold::for_round(round),
            block,
            self.slot,
            cert.stake,
            quorum.total_stake()
        );
        self.certificate = Some(cert.clone());
        Some(cert)
    }

    /// Whether any block currently meets the fast quorum in round 1.
    pub fn has_fast_quorum(&self, quorum: &QuorumCalculator) -> bool {
        self.round1
            .by_block
            .values()
            .any(|voters| quorum.meets_quorum(voters, Threshold::Fast))
    }

    /// The formed certificate.
    pub fn certificate(&self) -> Option<&QuorumCertificate> {
        self.certificate.as_ref()
    }

    /// The vote `validator` cast in `round`.
    pub fn vote_of(&self, validator: &ValidatorId, round: Round) -> Option<&Vote> {
        let votes = match round {
            Round::Round1 => &self.round1,
            Round::Round2 => &self.round2,
        };
        votes.by_validator.get(validator).map(|a| &a.vote)
    }

    /// Whether `validator` has a recorded vote in `round`.
    pub fn has_voted(&self, validator: &ValidatorId, round: Round) -> bool {
        self.vote_of(validator, round).is_some()
    }

    /// Voters for `block` in `round`.
    pub fn voters(&self, block: &BlockId, round: Round) -> Option<&VoterSet> {
        match round {
            Round::Round1 => self.round1.voters_for(block),
            Round::Round2 => self.round2.voters_for(block),
        }
    }

    /// All accepted votes, round 1 first.
    pub fn accepted_votes(&self) -> impl Iterator<Item = &AcceptedVote> {
        self.round1
            .by_validator
            .values()
            .chain(self.round2.by_validator.values())
    }

    /// Equivocation evidence collected so far.
    pub fn evidence(&self) -> &[EquivocationEvidence] {
        &self.evidence
    }

    /// Get statistics.
    pub fn stats(&self) -> VoteStats {
        let mut blocks: Vec<&BlockId> = self
            .round1
            .by_block
            .keys()
            .chain(self.round2.by_block.keys())
            .collect();
        blocks.sort();
        blocks.dedup();
        VoteStats {
            round1_votes: self.round1.by_validator.len(),
            round2_votes: self.round2.by_validator.len(),
            blocks: blocks.len(),
            conflicts: self.evidence.len(),
        }
    }
}
