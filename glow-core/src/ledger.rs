//! Finalized ledger.
//!
//! Append-only mapping from slot to exactly one outcome: a finalized block
//! with its quorum certificate, or a skip certificate. This is the result a
//! validator exposes to the execution layer. Each validator keeps its own
//! view; agreement across views follows from quorum intersection.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::certificate::{QuorumCertificate, SkipCertificate};
use crate::types::{BlockId, Round, Slot};

/// What a ledger slot resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A block was finalized.
    Finalized(BlockId),
    /// The slot was skipped.
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Finalized(block) => write!(f, "finalized {}", block),
            Outcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// A ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntry {
    /// Finalized block and the certificate that finalized it.
    Finalized(QuorumCertificate),
    /// Skip marker and its certificate.
    Skipped(SkipCertificate),
}

impl LedgerEntry {
    /// Outcome recorded by this entry.
    pub fn outcome(&self) -> Outcome {
        match self {
            LedgerEntry::Finalized(cert) => Outcome::Finalized(cert.block),
            LedgerEntry::Skipped(_) => Outcome::Skipped,
        }
    }

    /// Slot recorded by this entry.
    pub fn slot(&self) -> Slot {
        match self {
            LedgerEntry::Finalized(cert) => cert.slot,
            LedgerEntry::Skipped(cert) => cert.slot,
        }
    }
}

/// Attempt to record a second, different outcome for a slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ledger conflict at {slot}: recorded {existing}, attempted {attempted}")]
pub struct LedgerConflict {
    /// Slot in conflict.
    pub slot: Slot,
    /// Outcome already recorded.
    pub existing: Outcome,
    /// Outcome that was refused.
    pub attempted: Outcome,
}

/// Ledger statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Slots finalized in round 1.
    pub fast_finalized: u64,
    /// Slots finalized in round 2.
    pub fallback_finalized: u64,
    /// Slots skipped.
    pub skipped: u64,
    /// Highest recorded slot.
    pub highest_slot: Option<Slot>,
}

impl LedgerStats {
    /// Total finalized slots.
    pub fn finalized(&self) -> u64 {
        self.fast_finalized + self.fallback_finalized
    }
}

/// Append-only slot to outcome mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedLedger {
    entries: BTreeMap<Slot, LedgerEntry>,
}

impl FinalizedLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finalized block.
    ///
    /// Returns `Ok(true)` if the entry was added, `Ok(false)` if the same
    /// block was already recorded for the slot.
    pub fn record_finalized(&mut self, cert: QuorumCertificate) -> Result<bool, LedgerConflict> {
        self.record(LedgerEntry::Finalized(cert))
    }

    /// Record a skipped slot.
    ///
    /// Returns `Ok(true)` if the entry was added, `Ok(false)` if the slot was
    /// already recorded as skipped.
    pub fn record_skip(&mut self, cert: SkipCertificate) -> Result<bool, LedgerConflict> {
        self.record(LedgerEntry::Skipped(cert))
    }

    fn record(&mut self, entry: LedgerEntry) -> Result<bool, LedgerConflict> {
        let slot = entry.slot();
        match self.entries.get(&slot) {
            Some(existing) if existing.outcome() == entry.outcome() => Ok(false),
            Some(existing) => Err(LedgerConflict {
                slot,
                existing: existing.outcome(),
                attempted: entry.outcome(),
            }),
            None => {
                self.entries.insert(slot, entry);
                Ok(true)
            }
        }
    }

    /// Would recording `outcome` at `slot` conflict with what is recorded?
    pub fn check(&self, slot: Slot, outcome: Outcome) -> Result<(), LedgerConflict> {
        match self.entries.get(&slot) {
            Some(existing) if existing.outcome() != outcome => Err(LedgerConflict {
                slot,
                existing: existing.outcome(),
                attempted: outcome,
            }),
            _ => Ok(()),
        }
    }

    /// Entry for a slot.
    pub fn get(&self, slot: Slot) -> Option<&LedgerEntry> {
        self.entries.get(&slot)
    }

    /// Outcome for a slot.
    pub fn outcome(&self, slot: Slot) -> Option<Outcome> {
        self.entries.get(&slot).map(LedgerEntry::outcome)
    }

    /// Block finalized at a slot, if any.
    pub fn finalized_block(&self, slot: Slot) -> Option<BlockId> {
        match self.entries.get(&slot) {
            Some(LedgerEntry::Finalized(cert)) => Some(cert.block),
            _ => None,
        }
    }

    /// Whether the slot was skipped.
    pub fn is_skipped(&self, slot: Slot) -> bool {
        matches!(self.entries.get(&slot), Some(LedgerEntry::Skipped(_)))
    }

    /// Whether the slot has any outcome.
    pub fn contains(&self, slot: Slot) -> bool {
        self.entries.contains_key(&slot)
    }

    /// Highest recorded slot.
    pub fn highest_slot(&self) -> Option<Slot> {
        self.entries.keys().next_back().copied()
    }

    /// Number of recorded slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&Slot, &LedgerEntry)> {
        self.entries.iter()
    }

    /// Get statistics.
    pub fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats {
            highest_slot: self.highest_slot(),
            ..LedgerStats::default()
        };
        for entry in self.entries.values() {
            match entry {
                LedgerEntry::Finalized(cert) if cert.round == Round::Round1 => {
                    stats.fast_finalized += 1
                }
                LedgerEntry::Finalized(_) => stats.fallback_finalized += 1,
                LedgerEntry::Skipped(_) => stats.skipped += 1,
            }
        }
        stats
    }
}
