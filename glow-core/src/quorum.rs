//! Stake-weighted quorum arithmetic.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::params::{percent_threshold, FALLBACK_QUORUM_PCT, FAST_QUORUM_PCT, SKIP_QUORUM_PCT};
use crate::stake::{StakeTable, VoterSet};
use crate::types::{Round, ValidatorId};

/// Which quorum a voter set is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    /// 80% of stake, finalizes in round 1.
    Fast,
    /// 60% of stake, finalizes in round 2.
    Fallback,
    /// 60% of stake, skips the slot.
    Skip,
}

impl Threshold {
    /// Threshold a certificate of the given round must meet.
    pub fn for_round(round: Round) -> Self {
        match round {
            Round::Round1 => Threshold::Fast,
            Round::Round2 => Threshold::Fallback,
        }
    }

    /// Stake percentage.
    pub fn pct(self) -> u64 {
        match self {
            Threshold::Fast => FAST_QUORUM_PCT,
            Threshold::Fallback => FALLBACK_QUORUM_PCT,
            Threshold::Skip => SKIP_QUORUM_PCT,
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Fast => write!(f, "fast"),
            Threshold::Fallback => write!(f, "fallback"),
            Threshold::Skip => write!(f, "skip"),
        }
    }
}

/// Pure quorum evaluation over an immutable stake table.
///
/// Cheap to clone; the table is shared.
#[derive(Debug, Clone)]
pub struct QuorumCalculator {
    table: Arc<StakeTable>,
    fast: u64,
    fallback: u64,
    skip: u64,
}

impl QuorumCalculator {
    /// Build a calculator. Fails on an empty table or zero total stake.
    pub fn new(table: StakeTable) -> Result<Self> {
        Self::from_shared(Arc::new(table))
    }

    /// Build a calculator over an already-shared table.
    pub fn from_shared(table: Arc<StakeTable>) -> Result<Self> {
        if table.is_empty() {
            return Err(Error::empty_validator_set());
        }
        let total = table.total_stake();
        if total == 0 {
            return Err(Error::zero_total_stake());
        }
        Ok(Self {
            fast: percent_threshold(total, FAST_QUORUM_PCT),
            fallback: percent_threshold(total, FALLBACK_QUORUM_PCT),
            skip: percent_threshold(total, SKIP_QUORUM_PCT),
            table,
        })
    }

    /// The stake table this calculator evaluates against.
    pub fn table(&self) -> &StakeTable {
        &self.table
    }

    /// Shared handle to the stake table.
    pub fn shared_table(&self) -> Arc<StakeTable> {
        Arc::clone(&self.table)
    }

    /// Sum of all stake.
    pub fn total_stake(&self) -> u64 {
        self.table.total_stake()
    }

    /// Minimum stake required for a threshold.
    pub fn required(&self, threshold: Threshold) -> u64 {
        match threshold {
            Threshold::Fast => self.fast,
            Threshold::Fallback => self.fallback,
            Threshold::Skip => self.skip,
        }
    }

    /// Stake of one validator; unknown validators weigh nothing.
    pub fn stake_of(&self, validator: &ValidatorId) -> u64 {
        self.table.stake(validator).unwrap_or(0)
    }

    /// Combined stake of a voter set.
    pub fn stake_of_set(&self, voters: &VoterSet) -> u64 {
        voters
            .iter()
            .map(|v| self.stake_of(v))
            .fold(0u64, u64::saturating_add)
    }

    /// Whether a voter set's stake meets the threshold (inclusive).
    pub fn meets_quorum(&self, voters: &VoterSet, threshold: Threshold) -> bool {
        self.stake_of_set(voters) >= self.required(threshold)
    }
}
