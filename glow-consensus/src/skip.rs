//! Skip votes and skip certificates.
//!
//! A slot whose deadline passes without a received block can be skipped once
//! 60% of stake votes to skip it. Skip and finalize are exclusive: a slot
//! with a finalized block never forms a skip certificate.

use std::collections::BTreeMap;

use glow_core::{
    FinalizedLedger, QuorumCalculator, SkipCertificate, SkipVote, Slot, Threshold, ValidatorId,
    VoterSet,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dissemination::Disseminator;
use crate::rejection::{Rejection, SkipFault};

#[derive(Debug, Clone, Default)]
struct SkipSlot {
    voters: VoterSet,
    certificate: Option<SkipCertificate>,
}

/// Skip statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipStats {
    /// Skip votes accepted across all slots.
    pub votes: usize,
    /// Skip certificates formed.
    pub certificates: usize,
}

/// Skip-vote collection, keyed by slot.
#[derive(Debug, Clone, Default)]
pub struct SkipManager {
    slots: BTreeMap<Slot, SkipSlot>,
}

impl SkipManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a skip vote.
    ///
    /// `timed_out` tells whether the slot deadline has passed. A validator
    /// that received any block of the slot may not skip it.
    pub fn cast_skip_vote(
        &mut self,
        vote: SkipVote,
        timed_out: bool,
        disseminator: &Disseminator,
    ) -> Result<(), Rejection> {
        if !timed_out {
            return Err(Rejection::SkipNotAllowed {
                validator: vote.validator,
                slot: vote.slot,
                fault: SkipFault::NotTimedOut,
            });
        }
        if disseminator.received_any_in_slot(&vote.validator, vote.slot) {
            return Err(Rejection::SkipNotAllowed {
                validator: vote.validator,
                slot: vote.slot,
                fault: SkipFault::BlockReceived,
            });
        }
        let entry = self.slots.entry(vote.slot).or_default();
        if !entry.voters.insert(vote.validator) {
            return Err(Rejection::DuplicateSkipVote {
                validator: vote.validator,
                slot: vote.slot,
            });
        }
        debug!("Accepted {}", vote);
        Ok(())
    }

    /// Form the skip certificate for `slot` once 60% of stake voted to skip.
    ///
    /// Returns the same certificate on every later call. Never forms one for
    /// a slot the ledger already finalized.
    pub fn check_skip_quorum(
        &mut self,
        slot: Slot,
        quorum: &QuorumCalculator,
        ledger: &FinalizedLedger,
    ) -> Option<SkipCertificate> {
        let entry = self.slots.get_mut(&slot)?;
        if let Some(cert) = &entry.certificate {
            return Some(cert.clone());
        }
        if ledger.finalized_block(slot).is_some() {
            return None;
        }
        if !quorum.meets_quorum(&entry.voters, Threshold::Skip) {
            return None;
        }
        let cert = SkipCertificate::new(slot, entry.voters.clone(), quorum);
        info!(
            "Skip quorum for {}: stake {}/{}",
            slot,
            cert.stake,
            quorum.total_stake()
        );
        entry.certificate = Some(cert.clone());
        Some(cert)
    }

    /// Whether `validator` cast a skip vote for `slot`.
    pub fn has_voted(&self, validator: &ValidatorId, slot: Slot) -> bool {
        self.slots
            .get(&slot)
            .map(|s| s.voters.contains(validator))
            .unwrap_or(false)
    }

    /// Skip voters for `slot`.
    pub fn voters(&self, slot: Slot) -> Option<&VoterSet> {
        self.slots.get(&slot).map(|s| &s.voters)
    }

    /// Skip certificate for `slot`.
    pub fn certificate(&self, slot: Slot) -> Option<&SkipCertificate> {
        self.slots.get(&slot).and_then(|s| s.certificate.as_ref())
    }

    /// All formed skip certificates.
    pub fn certificates(&self) -> impl Iterator<Item = &SkipCertificate> {
        self.slots.values().filter_map(|s| s.certificate.as_ref())
    }

    /// Get statistics.
    pub fn stats(&self) -> SkipStats {
        SkipStats {
            votes: self.slots.values().map(|s| s.voters.len()).sum(),
            certificates: self.certificates().count(),
        }
    }
}
