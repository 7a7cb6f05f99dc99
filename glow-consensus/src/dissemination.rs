//! Block dissemination gate.
//!
//! Blocks travel as erasure-coded reconstruction units. The coding itself is
//! out of scope: a validator that holds at least 80% of a block's distinct
//! units counts as having received the block, and only then may its votes
//! for that block be accepted.
//!
//! ```text
//! unit(v, s, B, k) ──► ReconstructionState(v, s, B) ──► received? ──► Votor gate
//!                       units: {k, ...}                  frozen once true
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use glow_core::params::{percent_threshold, RECONSTRUCTION_PCT};
use glow_core::{BlockId, Error, Result, Slot, StakeTable, ValidatorId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rejection::Rejection;

/// Reconstruction progress of one validator for one block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionState {
    units: BTreeSet<u32>,
    received: bool,
}

impl ReconstructionState {
    /// Distinct units held.
    pub fn units(&self) -> u64 {
        self.units.len() as u64
    }

    /// Whether the block counts as received.
    pub fn is_received(&self) -> bool {
        self.received
    }
}

/// Effect of recording a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// New unit, threshold not reached yet.
    Recorded,
    /// New unit that crossed the threshold.
    NowReceived,
    /// Unit already held.
    Duplicate,
    /// Block already received; state is frozen.
    AlreadyReceived,
}

/// Blocks without a recorded proposal tracked per holder and slot.
pub const DEFAULT_BLOCK_LIMIT: usize = 4;

/// Per-(validator, slot, block) reconstruction tracking.
///
/// A unit's slot claim only scopes the state it lands in; it never decides
/// which slot a block belongs to. Blocks of a recorded proposal are always
/// tracked, any others are capped per holder and slot.
#[derive(Debug, Clone)]
pub struct Disseminator {
    total_units: u32,
    threshold: u64,
    block_limit: usize,
    states: HashMap<(ValidatorId, Slot, BlockId), ReconstructionState>,
    proposed: HashSet<(Slot, BlockId)>,
    unproposed: HashMap<(ValidatorId, Slot), BTreeSet<BlockId>>,
    received_in_slot: HashMap<(ValidatorId, Slot), BTreeSet<BlockId>>,
}

impl Disseminator {
    /// Create a disseminator for blocks of `total_units` units.
    pub fn new(total_units: u32) -> Result<Self> {
        if total_units == 0 {
            return Err(Error::invalid_config("total units must be at least 1"));
        }
        Ok(Self {
            total_units,
            threshold: percent_threshold(u64::from(total_units), RECONSTRUCTION_PCT),
            block_limit: DEFAULT_BLOCK_LIMIT,
            states: HashMap::new(),
            proposed: HashSet::new(),
            unproposed: HashMap::new(),
            received_in_slot: HashMap::new(),
        })
    }

    /// Set how many blocks without a proposal one holder may track per slot.
    pub fn with_block_limit(mut self, limit: usize) -> Self {
        self.block_limit = limit.max(1);
        self
    }

    /// Units per block.
    pub fn total_units(&self) -> u32 {
        self.total_units
    }

    /// Distinct units needed for "received".
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Blocks without a proposal tracked per holder and slot.
    pub fn block_limit(&self) -> usize {
        self.block_limit
    }

    /// Record that `validator` holds unit `unit` of `block` in `slot`. Idempotent.
    pub fn record_unit(
        &mut self,
        validator: ValidatorId,
        block: BlockId,
        slot: Slot,
        unit: u32,
    ) -> std::result::Result<UnitOutcome, Rejection> {
        if unit >= self.total_units {
            return Err(Rejection::InvalidUnit {
                block,
                unit,
                reason: format!("index out of range (total {})", self.total_units),
            });
        }
        self.admit(validator, block, slot, unit)?;

        let threshold = self.threshold;
        let state = self.states.entry((validator, slot, block)).or_default();
        if state.received {
            return Ok(UnitOutcome::AlreadyReceived);
        }
        if !state.units.insert(unit) {
            return Ok(UnitOutcome::Duplicate);
        }
        if state.units() < threshold {
            return Ok(UnitOutcome::Recorded);
        }
        state.received = true;
        let units = state.units();
        self.received_in_slot
            .entry((validator, slot))
            .or_default()
            .insert(block);
        debug!(
            "{} reconstructed {} in {} with {} units",
            validator, block, slot, units
        );
        Ok(UnitOutcome::NowReceived)
    }

    /// Record `block` as the proposal for `slot`, held in full by `validator`
    /// (the leader that built it). Returns whether anything changed.
    pub fn mark_complete(&mut self, validator: ValidatorId, block: BlockId, slot: Slot) -> bool {
        if self.proposed.insert((slot, block)) {
            for ((_, s), blocks) in self.unproposed.iter_mut() {
                if *s == slot {
                    blocks.remove(&block);
                }
            }
        }
        let state = self.states.entry((validator, slot, block)).or_default();
        if state.received {
            return false;
        }
        state.units.extend(0..self.total_units);
        state.received = true;
        self.received_in_slot
            .entry((validator, slot))
            .or_default()
            .insert(block);
        true
    }

    fn admit(
        &mut self,
        validator: ValidatorId,
        block: BlockId,
        slot: Slot,
        unit: u32,
    ) -> std::result::Result<(), Rejection> {
        if self.proposed.contains(&(slot, block)) {
            return Ok(());
        }
        let blocks = self.unproposed.entry((validator, slot)).or_default();
        if blocks.contains(&block) {
            return Ok(());
        }
        if blocks.len() >= self.block_limit {
            return Err(Rejection::InvalidUnit {
                block,
                unit,
                reason: format!(
                    "{} already tracks {} unproposed blocks in {}",
                    validator,
                    blocks.len(),
                    slot
                ),
            });
        }
        blocks.insert(block);
        Ok(())
    }

    /// Whether `validator` has received `block` in `slot`. Monotonic.
    pub fn is_received(&self, validator: &ValidatorId, slot: Slot, block: &BlockId) -> bool {
        self.state(validator, slot, block)
            .map(|s| s.received)
            .unwrap_or(false)
    }

    /// Distinct units `validator` holds for `block` in `slot`.
    pub fn units(&self, validator: &ValidatorId, slot: Slot, block: &BlockId) -> u64 {
        self.state(validator, slot, block)
            .map(ReconstructionState::units)
            .unwrap_or(0)
    }

    /// Reconstruction state, if any unit was recorded.
    pub fn state(
        &self,
        validator: &ValidatorId,
        slot: Slot,
        block: &BlockId,
    ) -> Option<&ReconstructionState> {
        self.states.get(&(*validator, slot, *block))
    }

    /// Whether `validator` received any block of `slot`.
    pub fn received_any_in_slot(&self, validator: &ValidatorId, slot: Slot) -> bool {
        self.received_in_slot
            .get(&(*validator, slot))
            .map(|blocks| !blocks.is_empty())
            .unwrap_or(false)
    }

    /// Whether any validator received `block` in `slot`.
    pub fn received_by_anyone(&self, slot: Slot, block: &BlockId) -> bool {
        self.received_in_slot
            .iter()
            .any(|((_, s), blocks)| *s == slot && blocks.contains(block))
    }

    /// All tracked states.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&(ValidatorId, Slot, BlockId), &ReconstructionState)> {
        self.states.iter()
    }
}

/// Assignment of a block's units to relay validators.
///
/// Units are spread stake-proportionally (largest remainder, ties broken by
/// table order), so a relay plan is deterministic for a given table. Each
/// validator with positive stake receives at least its floor share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayPlan {
    relays: Vec<ValidatorId>,
}

impl RelayPlan {
    /// Assign `total_units` units over `table`.
    pub fn assign(table: &StakeTable, total_units: u32) -> Result<Self> {
        let total_stake = u128::from(table.total_stake());
        if table.is_empty() || total_stake == 0 {
            return Err(Error::zero_total_stake());
        }
        let units = u128::from(total_units);

        let mut counts: Vec<(usize, u128, u128)> = table
            .iter()
            .enumerate()
            .map(|(idx, v)| {
                let exact = units * u128::from(v.stake);
                (idx, exact / total_stake, exact % total_stake)
            })
            .collect();

        let assigned: u128 = counts.iter().map(|(_, n, _)| n).sum();
        let mut by_remainder: Vec<usize> = (0..counts.len()).collect();
        by_remainder.sort_by(|a, b| counts[*b].2.cmp(&counts[*a].2).then(a.cmp(b)));
        for idx in by_remainder.into_iter().take((units - assigned) as usize) {
            counts[idx].1 += 1;
        }

        let validators = table.validators();
        let relays = counts
            .into_iter()
            .flat_map(|(idx, n, _)| std::iter::repeat(validators[idx].id).take(n as usize))
            .collect();
        Ok(Self { relays })
    }

    /// Relay responsible for `unit`.
    pub fn relay_for(&self, unit: u32) -> Option<ValidatorId> {
        self.relays.get(unit as usize).copied()
    }

    /// Units relayed by `validator`.
    pub fn units_for(&self, validator: &ValidatorId) -> Vec<u32> {
        self.relays
            .iter()
            .enumerate()
            .filter(|(_, v)| *v == validator)
            .map(|(unit, _)| unit as u32)
            .collect()
    }

    /// Number of units in the plan.
    pub fn len(&self) -> usize {
        self.relays.len()
    }

    /// Check if the plan has no units.
    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }
}
