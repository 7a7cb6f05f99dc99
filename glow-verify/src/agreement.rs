//! Cross-engine agreement.
//!
//! Each validator keeps its own ledger. Safety across the network means no
//! two ledgers ever disagree on the outcome of a slot, whatever order the
//! network delivered messages in.

use std::collections::BTreeMap;

use glow_core::{Outcome, Slot, ValidatorId};
use serde::{Deserialize, Serialize};

use crate::invariants::InvariantViolation;
use crate::ProtocolState;

/// Summary of the outcomes seen across a set of ledgers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementReport {
    /// Number of ledgers compared.
    pub ledgers: usize,
    /// Agreed outcome for every slot at least one ledger decided.
    pub outcomes: BTreeMap<Slot, Outcome>,
    /// Slots every ledger has decided.
    pub decided_by_all: usize,
}

impl AgreementReport {
    /// Number of distinct slots finalized somewhere.
    pub fn finalized(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, Outcome::Finalized(_)))
            .count()
    }

    /// Number of distinct slots skipped somewhere.
    pub fn skipped(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, Outcome::Skipped))
            .count()
    }
}

/// Check that no two ledgers disagree on any slot.
///
/// `states` pairs each engine with the validator it runs for, used only to
/// name the disagreeing parties.
pub fn check_agreement<'a, S, I>(states: I) -> Result<AgreementReport, InvariantViolation>
where
    S: ProtocolState + 'a,
    I: IntoIterator<Item = (ValidatorId, &'a S)>,
{
    let mut report = AgreementReport::default();
    let mut first_seen: BTreeMap<Slot, (ValidatorId, Outcome)> = BTreeMap::new();
    let mut decided_counts: BTreeMap<Slot, usize> = BTreeMap::new();

    for (validator, state) in states {
        report.ledgers += 1;
        for (slot, entry) in state.ledger().iter() {
            let outcome = entry.outcome();
            *decided_counts.entry(*slot).or_default() += 1;
            let (owner, agreed) = *first_seen.entry(*slot).or_insert((validator, outcome));
            if agreed != outcome {
                return Err(InvariantViolation::new(
                    "agreement",
                    format!(
                        "{} recorded {} but {} recorded {}",
                        owner, agreed, validator, outcome
                    ),
                )
                .at_slot(*slot));
            }
        }
    }

    report.decided_by_all = decided_counts
        .values()
        .filter(|count| **count == report.ledgers)
        .count();
    report.outcomes = first_seen
        .into_iter()
        .map(|(slot, (_, outcome))| (slot, outcome))
        .collect();
    Ok(report)
}
