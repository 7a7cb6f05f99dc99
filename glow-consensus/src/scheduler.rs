//! Slot and round scheduling.
//!
//! Owns the current slot, its leader, round and logical deadlines. Every
//! transition is driven by the engine in response to a single event.
//!
//! ```text
//! AwaitingProposal ──► Round1 ──► Round2 ──► Closed
//!        │               │          │          ▲
//!        └───────────────┴──────────┴──► SkipPending
//!                (slot deadline)
//! ```

use std::fmt;
use std::sync::Arc;

use glow_core::{hash_all, Round, Slot, StakeTable, ValidatorId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{EngineConfig, LeaderScheduleKind};

/// Leader rotation policy.
///
/// The table handed in is never empty.
pub trait LeaderSchedule: fmt::Debug + Send + Sync {
    /// Leader of `slot`.
    fn leader(&self, table: &StakeTable, slot: Slot) -> ValidatorId;
}

/// `slot mod n` over table order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

impl LeaderSchedule for RoundRobin {
    fn leader(&self, table: &StakeTable, slot: Slot) -> ValidatorId {
        let validators = table.validators();
        let idx = (slot.number() % validators.len() as u64) as usize;
        validators[idx].id
    }
}

/// Stake-proportional rotation seeded by the slot number.
///
/// Deterministic: every validator derives the same leader for a slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct StakeWeighted;

impl LeaderSchedule for StakeWeighted {
    fn leader(&self, table: &StakeTable, slot: Slot) -> ValidatorId {
        let total = table.total_stake();
        if total == 0 {
            return RoundRobin.leader(table, slot);
        }
        let seed = hash_all(&[
            b"glow-leader".as_slice(),
            slot.number().to_le_bytes().as_slice(),
        ]);
        let mut target = seed.prefix_u64() % total;
        for v in table.iter() {
            if target < v.stake {
                return v.id;
            }
            target -= v.stake;
        }
        RoundRobin.leader(table, slot)
    }
}

impl LeaderScheduleKind {
    /// Instantiate the policy.
    pub fn build(self) -> Arc<dyn LeaderSchedule> {
        match self {
            LeaderScheduleKind::RoundRobin => Arc::new(RoundRobin),
            LeaderScheduleKind::StakeWeighted => Arc::new(StakeWeighted),
        }
    }
}

/// Phase of the current slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPhase {
    /// Waiting for the leader's block to be proposed and received.
    AwaitingProposal,
    /// Round-1 voting.
    Round1,
    /// Round-2 voting.
    Round2,
    /// Slot deadline passed; only skip votes and certificates are accepted.
    SkipPending,
    /// Slot decided.
    Closed,
}

impl SlotPhase {
    /// Whether the slot is still undecided.
    pub fn is_open(self) -> bool {
        self != SlotPhase::Closed
    }
}

impl fmt::Display for SlotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotPhase::AwaitingProposal => write!(f, "awaiting_proposal"),
            SlotPhase::Round1 => write!(f, "round1"),
            SlotPhase::Round2 => write!(f, "round2"),
            SlotPhase::SkipPending => write!(f, "skip_pending"),
            SlotPhase::Closed => write!(f, "closed"),
        }
    }
}

/// A deadline that fired on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Round 1 expired.
    Round1,
    /// Round 2 expired.
    Round2,
    /// The whole slot expired.
    Slot,
}

/// Logical deadlines of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDeadlines {
    /// Tick the slot started at.
    pub started_at: u64,
    /// Round-1 deadline.
    pub round1: u64,
    /// Round-2 deadline.
    pub round2: u64,
    /// Slot deadline.
    pub slot: u64,
}

impl SlotDeadlines {
    fn starting_at(now: u64, round1_timeout: u64, round2_timeout: u64, slot_timeout: u64) -> Self {
        let round1 = now.saturating_add(round1_timeout);
        Self {
            started_at: now,
            round1,
            round2: round1.saturating_add(round2_timeout),
            slot: now.saturating_add(slot_timeout),
        }
    }
}

/// History entry for a finished or running slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    /// Slot number.
    pub slot: Slot,
    /// Leader of the slot.
    pub leader: ValidatorId,
    /// Deadlines of the slot.
    pub deadlines: SlotDeadlines,
    /// Tick round 2 was entered at.
    pub round2_entered_at: Option<u64>,
}

/// Slot, round, leader and timers.
#[derive(Debug, Clone)]
pub struct SlotScheduler {
    table: Arc<StakeTable>,
    schedule: Arc<dyn LeaderSchedule>,
    round1_timeout: u64,
    round2_timeout: u64,
    slot_timeout: u64,
    slot: Slot,
    leader: ValidatorId,
    round: Round,
    phase: SlotPhase,
    deadlines: SlotDeadlines,
    proposal_recorded: bool,
    fired: [bool; 3],
    round2_entered_at: Option<u64>,
    history: Vec<SlotRecord>,
}

impl SlotScheduler {
    /// Start at slot 0, tick `now`.
    pub fn new(
        table: Arc<StakeTable>,
        schedule: Arc<dyn LeaderSchedule>,
        config: &EngineConfig,
        now: u64,
    ) -> Self {
        let leader = Self::pick_leader(&table, schedule.as_ref(), Slot::GENESIS);
        Self {
            table,
            schedule,
            round1_timeout: config.round1_timeout,
            round2_timeout: config.round2_timeout,
            slot_timeout: config.slot_timeout,
            slot: Slot::GENESIS,
            leader,
            round: Round::Round1,
            phase: SlotPhase::AwaitingProposal,
            deadlines: SlotDeadlines::starting_at(
                now,
                config.round1_timeout,
                config.round2_timeout,
                config.slot_timeout,
            ),
            proposal_recorded: false,
            fired: [false; 3],
            round2_entered_at: None,
            history: Vec::new(),
        }
    }

    fn pick_leader(table: &StakeTable, schedule: &dyn LeaderSchedule, slot: Slot) -> ValidatorId {
        let leader = schedule.leader(table, slot);
        if table.contains(&leader) {
            return leader;
        }
        warn!(
            "Leader schedule chose {} for {}, not in stake table; using round robin",
            leader, slot
        );
        RoundRobin.leader(table, slot)
    }

    /// Current slot.
    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Leader of the current slot.
    pub fn leader(&self) -> ValidatorId {
        self.leader
    }

    /// Leader of an arbitrary slot.
    pub fn leader_for(&self, slot: Slot) -> ValidatorId {
        Self::pick_leader(&self.table, self.schedule.as_ref(), slot)
    }

    /// Current round (1 until round 2 is entered).
    pub fn round(&self) -> Round {
        self.round
    }

    /// Current phase.
    pub fn phase(&self) -> SlotPhase {
        self.phase
    }

    /// Deadlines of the current slot.
    pub fn deadlines(&self) -> SlotDeadlines {
        self.deadlines
    }

    /// Whether a proposal was recorded for the current slot.
    pub fn has_proposal(&self) -> bool {
        self.proposal_recorded
    }

    /// Note that the slot's proposal was recorded.
    pub fn record_proposal(&mut self) {
        self.proposal_recorded = true;
    }

    /// Move `AwaitingProposal → Round1` once the proposal was received.
    pub fn enter_round1(&mut self) -> bool {
        if self.phase != SlotPhase::AwaitingProposal || !self.proposal_recorded {
            return false;
        }
        self.phase = SlotPhase::Round1;
        debug!("{} entered round 1", self.slot);
        true
    }

    /// Fire every deadline that passed at `now`, in order, at most once each.
    pub fn poll(&mut self, now: u64) -> Vec<Deadline> {
        let mut fired = Vec::new();
        if !self.phase.is_open() {
            return fired;
        }
        let due = [
            (Deadline::Round1, self.deadlines.round1),
            (Deadline::Round2, self.deadlines.round2),
            (Deadline::Slot, self.deadlines.slot),
        ];
        for (idx, (deadline, at)) in due.into_iter().enumerate() {
            if !self.fired[idx] && now >= at {
                self.fired[idx] = true;
                fired.push(deadline);
            }
        }
        fired
    }

    /// Round-1 expiry: move to round 2 if a proposal exists.
    ///
    /// Returns true if round 2 was entered.
    pub fn expire_round1(&mut self, now: u64) -> bool {
        let eligible = match self.phase {
            SlotPhase::Round1 => true,
            SlotPhase::AwaitingProposal => self.proposal_recorded,
            _ => false,
        };
        if !eligible || now < self.deadlines.round1 {
            return false;
        }
        self.phase = SlotPhase::Round2;
        self.round = Round::Round2;
        self.round2_entered_at = Some(now);
        debug!("{} entered round 2 at tick {}", self.slot, now);
        true
    }

    /// Slot expiry: stop finalization voting, allow skip votes.
    pub fn expire_slot(&mut self) -> bool {
        if !matches!(
            self.phase,
            SlotPhase::AwaitingProposal | SlotPhase::Round1 | SlotPhase::Round2
        ) {
            return false;
        }
        self.phase = SlotPhase::SkipPending;
        debug!("{} expired, skip votes open", self.slot);
        true
    }

    /// Mark the slot decided.
    pub fn close(&mut self) {
        self.phase = SlotPhase::Closed;
    }

    /// Advance to the next slot at tick `now`.
    pub fn advance(&mut self, now: u64) -> Slot {
        self.history.push(self.current_record());
        self.slot = self.slot.next();
        self.leader = Self::pick_leader(&self.table, self.schedule.as_ref(), self.slot);
        self.round = Round::Round1;
        self.phase = SlotPhase::AwaitingProposal;
        self.deadlines = SlotDeadlines::starting_at(
            now,
            self.round1_timeout,
            self.round2_timeout,
            self.slot_timeout,
        );
        self.proposal_recorded = false;
        self.fired = [false; 3];
        self.round2_entered_at = None;
        debug!("Starting {} with leader {}", self.slot, self.leader);
        self.slot
    }

    fn current_record(&self) -> SlotRecord {
        SlotRecord {
            slot: self.slot,
            leader: self.leader,
            deadlines: self.deadlines,
            round2_entered_at: self.round2_entered_at,
        }
    }

    /// Records of every slot so far, the current one last.
    pub fn records(&self) -> Vec<SlotRecord> {
        let mut records = self.history.clone();
        records.push(self.current_record());
        records
    }
}
