//! Engine configuration.
//!
//! All durations are logical ticks supplied by the timer collaborator, so a
//! run is replayable from its event log.

use glow_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Built-in leader rotation policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderScheduleKind {
    /// `slot mod n` over stake-table order.
    #[default]
    RoundRobin,
    /// Stake-proportional, seeded by the slot number.
    StakeWeighted,
}

/// Consensus engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ticks from slot start until round 1 expires.
    pub round1_timeout: u64,
    /// Ticks from the round-1 deadline until round 2 expires.
    pub round2_timeout: u64,
    /// Ticks from slot start until skip votes are allowed.
    pub slot_timeout: u64,
    /// Reconstruction units per block. `None` uses the validator count.
    pub total_units: Option<u32>,
    /// Leader rotation policy.
    pub leader_schedule: LeaderScheduleKind,
    /// How many slots ahead of the current one messages are held for.
    pub max_future_slots: u64,
    /// Upper bound on messages held for later processing.
    pub max_pending: usize,
    /// Blocks without a recorded proposal each holder may announce units for
    /// in one slot.
    pub max_blocks_per_slot: usize,
    /// Assert protocol invariants after every event.
    pub check_invariants: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            round1_timeout: 100,
            round2_timeout: 150,
            slot_timeout: 300,
            total_units: None,
            leader_schedule: LeaderScheduleKind::RoundRobin,
            max_future_slots: 4,
            max_pending: 4096,
            max_blocks_per_slot: 4,
            check_invariants: cfg!(debug_assertions),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration for a stake table of `validators` entries.
    pub fn validate(&self, validators: usize) -> Result<()> {
        if self.round1_timeout == 0 || self.round2_timeout == 0 {
            return Err(Error::invalid_config("round timeouts must be positive"));
        }
        let rounds = self
            .round1_timeout
            .checked_add(self.round2_timeout)
            .ok_or_else(|| Error::invalid_config("round timeouts overflow"))?;
        if self.slot_timeout < rounds {
            return Err(Error::invalid_config(format!(
                "slot timeout {} shorter than both rounds ({})",
                self.slot_timeout, rounds
            )));
        }
        if let Some(units) = self.total_units {
            if units == 0 {
                return Err(Error::invalid_config("total units must be at least 1"));
            }
            if (units as usize) < validators {
                return Err(Error::invalid_config(format!(
                    "total units {} below validator count {}",
                    units, validators
                )));
            }
        }
        if self.max_pending == 0 {
            return Err(Error::invalid_config("max_pending must be positive"));
        }
        if self.max_blocks_per_slot == 0 {
            return Err(Error::invalid_config("max_blocks_per_slot must be positive"));
        }
        Ok(())
    }

    /// Units per block for a table of `validators` entries.
    pub fn units_for(&self, validators: usize) -> u32 {
        self.total_units
            .unwrap_or_else(|| u32::try_from(validators).unwrap_or(u32::MAX))
            .max(1)
    }
}
