//! Property-based tests for core types.
//!
//! Uses proptest to verify quorum arithmetic and ledger invariants hold for
//! arbitrary stake distributions.

use proptest::prelude::*;

use crate::certificate::{QuorumCertificate, SkipCertificate};
use crate::ledger::FinalizedLedger;
use crate::params::percent_threshold;
use crate::quorum::{QuorumCalculator, Threshold};
use crate::stake::{StakeTable, Validator, VoterSet};
use crate::types::{BlockId, Round, Slot, ValidatorId};

// ============================================================================
// Arbitrary Implementations
// ============================================================================

/// Generate a stake table of 1..=20 validators with positive stake.
fn arb_stake_table() -> impl Strategy<Value = StakeTable> {
    prop::collection::vec(1u64..=1_000, 1..=20).prop_map(|stakes| {
        let validators = stakes
            .into_iter()
            .enumerate()
            .map(|(i, stake)| Validator::new(ValidatorId(i as u32 + 1), stake))
            .collect();
        StakeTable::new(validators).unwrap()
    })
}

/// Generate a table together with an arbitrary subset of its validators.
fn arb_table_and_subset() -> impl Strategy<Value = (StakeTable, VoterSet)> {
    arb_stake_table().prop_flat_map(|table| {
        let n = table.len();
        prop::collection::vec(any::<bool>(), n).prop_map(move |mask| {
            let subset = table
                .iter()
                .zip(mask)
                .filter(|(_, keep)| *keep)
                .map(|(v, _)| v.id)
                .collect();
            (table.clone(), subset)
        })
    })
}

fn arb_threshold() -> impl Strategy<Value = Threshold> {
    prop_oneof![
        Just(Threshold::Fast),
        Just(Threshold::Fallback),
        Just(Threshold::Skip),
    ]
}

// ============================================================================
// Quorum Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_meets_quorum_matches_floor_threshold(
        (table, subset) in arb_table_and_subset(),
        threshold in arb_threshold(),
    ) {
        let total = table.total_stake();
        let q = QuorumCalculator::new(table).unwrap();
        let stake = q.stake_of_set(&subset);
        let need = percent_threshold(total, threshold.pct());
        prop_assert_eq!(q.required(threshold), need);
        prop_assert_eq!(q.meets_quorum(&subset, threshold), stake >= need);
    }

    #[test]
    fn prop_quorum_monotone_under_superset(
        (table, subset) in arb_table_and_subset(),
        threshold in arb_threshold(),
    ) {
        let q = QuorumCalculator::new(table.clone()).unwrap();
        let everyone: VoterSet = table.ids().collect();
        if q.meets_quorum(&subset, threshold) {
            prop_assert!(q.meets_quorum(&everyone, threshold));
        }
        prop_assert!(q.meets_quorum(&everyone, threshold));
    }

    #[test]
    fn prop_fast_implies_fallback((table, subset) in arb_table_and_subset()) {
        let q = QuorumCalculator::new(table).unwrap();
        if q.meets_quorum(&subset, Threshold::Fast) {
            prop_assert!(q.meets_quorum(&subset, Threshold::Fallback));
            prop_assert!(q.meets_quorum(&subset, Threshold::Skip));
        }
    }

    #[test]
    fn prop_formed_certificates_verify((table, subset) in arb_table_and_subset()) {
        let q = QuorumCalculator::new(table).unwrap();
        let qc = QuorumCertificate::new(
            BlockId::digest(b"B"), Slot(0), Round::Round2, subset.clone(), &q,
        );
        let fallback_ok = !subset.is_empty() && q.meets_quorum(&subset, Threshold::Fallback);
        prop_assert_eq!(qc.verify(&q).is_ok(), fallback_ok);

        let sc = SkipCertificate::new(Slot(0), subset.clone(), &q);
        let skip_ok = !subset.is_empty() && q.meets_quorum(&subset, Threshold::Skip);
        prop_assert_eq!(sc.verify(&q).is_ok(), skip_ok);
    }

    #[test]
    fn prop_ledger_never_holds_two_outcomes(
        writes in prop::collection::vec((0u64..4, 0u8..3), 1..40),
    ) {
        let q = QuorumCalculator::new(StakeTable::uniform(5, 1).unwrap()).unwrap();
        let all: VoterSet = (1..=5).map(ValidatorId).collect();
        let mut ledger = FinalizedLedger::new();
        let mut first = std::collections::HashMap::new();

        for (slot, kind) in writes {
            let slot = Slot(slot);
            let result = match kind {
                0 | 1 => {
                    let block = BlockId::digest(&[kind]);
                    ledger.record_finalized(QuorumCertificate::new(
                        block, slot, Round::Round1, all.clone(), &q,
                    ))
                }
                _ => ledger.record_skip(SkipCertificate::new(slot, all.clone(), &q)),
            };
            let outcome = ledger.outcome(slot).unwrap();
            let expected = *first.entry(slot).or_insert(outcome);
            prop_assert_eq!(outcome, expected);
            if let Err(conflict) = result {
                prop_assert_eq!(conflict.existing, expected);
            }
        }
    }
}
