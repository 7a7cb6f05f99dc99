//! Quorum and skip certificates.
//!
//! A certificate is the recorded proof that a quorum of stake agreed on one
//! outcome for a slot: finalize a block (in round 1 or round 2) or skip the
//! slot. Certificates are created once and never mutated.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quorum::{QuorumCalculator, Threshold};
use crate::stake::VoterSet;
use crate::types::{BlockId, Round, Slot, ValidatorId};

/// Errors found while validating a certificate against a stake table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateError {
    #[error("certificate has no voters")]
    EmptyVoterSet,

    #[error("voter {0} is not in the stake table")]
    UnknownVoter(ValidatorId),

    #[error("stake mismatch: claimed {claimed}, actual {actual}")]
    StakeMismatch { claimed: u64, actual: u64 },

    #[error("insufficient {threshold} stake: have {have}, need {need}")]
    InsufficientStake {
        threshold: Threshold,
        have: u64,
        need: u64,
    },
}

/// Proof that a block reached the quorum of its round.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuorumCertificate {
    /// Finalized block.
    pub block: BlockId,
    /// Slot of the block.
    pub slot: Slot,
    /// Round whose quorum was met.
    pub round: Round,
    /// Validators whose votes formed the quorum.
    pub voters: VoterSet,
    /// Stake represented by `voters`.
    pub stake: u64,
}

impl QuorumCertificate {
    /// Assemble a certificate, computing the represented stake.
    pub fn new(
        block: BlockId,
        slot: Slot,
        round: Round,
        voters: VoterSet,
        quorum: &QuorumCalculator,
    ) -> Self {
        let stake = quorum.stake_of_set(&voters);
        Self {
            block,
            slot,
            round,
            voters,
            stake,
        }
    }

    /// Threshold this certificate must meet.
    pub fn threshold(&self) -> Threshold {
        Threshold::for_round(self.round)
    }

    /// Verify the certificate against a stake table.
    pub fn verify(&self, quorum: &QuorumCalculator) -> Result<(), CertificateError> {
        verify_voters(&self.voters, self.stake, self.threshold(), quorum)
    }
}

/// Proof that a slot was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkipCertificate {
    /// Skipped slot.
    pub slot: Slot,
    /// Validators whose skip votes formed the quorum.
    pub voters: VoterSet,
    /// Stake represented by `voters`.
    pub stake: u64,
}

impl SkipCertificate {
    /// Assemble a certificate, computing the represented stake.
    pub fn new(slot: Slot, voters: VoterSet, quorum: &QuorumCalculator) -> Self {
        let stake = quorum.stake_of_set(&voters);
        Self {
            slot,
            voters,
            stake,
        }
    }

    /// Verify the certificate against a stake table.
    pub fn verify(&self, quorum: &QuorumCalculator) -> Result<(), CertificateError> {
        verify_voters(&self.voters, self.stake, Threshold::Skip, quorum)
    }
}

fn verify_voters(
    voters: &VoterSet,
    claimed: u64,
    threshold: Threshold,
    quorum: &QuorumCalculator,
) -> Result<(), CertificateError> {
    if voters.is_empty() {
        return Err(CertificateError::EmptyVoterSet);
    }
    if let Some(unknown) = voters.iter().find(|v| !quorum.table().contains(v)) {
        return Err(CertificateError::UnknownVoter(*unknown));
    }
    let actual = quorum.stake_of_set(voters);
    if actual != claimed {
        return Err(CertificateError::StakeMismatch { claimed, actual });
    }
    let need = quorum.required(threshold);
    if actual < need {
        return Err(CertificateError::InsufficientStake {
            threshold,
            have: actual,
            need,
        });
    }
    Ok(())
}

/// Either kind of certificate, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Certificate {
    /// Finalizes a block.
    Quorum(QuorumCertificate),
    /// Skips a slot.
    Skip(SkipCertificate),
}

impl Certificate {
    /// Slot the certificate decides.
    pub fn slot(&self) -> Slot {
        match self {
            Certificate::Quorum(c) => c.slot,
            Certificate::Skip(c) => c.slot,
        }
    }

    /// Voters behind the certificate.
    pub fn voters(&self) -> &VoterSet {
        match self {
            Certificate::Quorum(c) => &c.voters,
            Certificate::Skip(c) => &c.voters,
        }
    }

    /// Verify the certificate against a stake table.
    pub fn verify(&self, quorum: &QuorumCalculator) -> Result<(), CertificateError> {
        match self {
            Certificate::Quorum(c) => c.verify(quorum),
            Certificate::Skip(c) => c.verify(quorum),
        }
    }
}

impl From<QuorumCertificate> for Certificate {
    fn from(cert: QuorumCertificate) -> Self {
        Certificate::Quorum(cert)
    }
}

impl From<SkipCertificate> for Certificate {
    fn from(cert: SkipCertificate) -> Self {
        Certificate::Skip(cert)
    }
}
