//! Scenario tests on a single engine.
//!
//! Five validators with stake 1 each, so the fast quorum is 4, the fallback
//! and skip quorums are 3, and a block is received with 4 of its 5 units.
//! The engine under test is an observer fed the other validators' messages
//! directly.

mod common;

use glow_consensus::{
    ConsensusEngine, ConsensusMessage, EngineConfig, EngineOutput, Event, FinalizeEvent,
    Rejection, SlotPhase, UnitMessage, VotorPhase,
};
use glow_core::{
    Block, Outcome, Round, SkipVote, Slot, StakeTable, Threshold, Validator, ValidatorId, Vote,
};

fn config() -> EngineConfig {
    EngineConfig {
        check_invariants: true,
        ..Default::default()
    }
}

fn five_validators() -> StakeTable {
    StakeTable::uniform(5, 1).unwrap()
}

fn deliver(engine: &mut ConsensusEngine, message: ConsensusMessage) -> Vec<EngineOutput> {
    engine.handle(Event::Message(message))
}

fn give_units(
    engine: &mut ConsensusEngine,
    holder: u32,
    block: &Block,
    units: std::ops::Range<u32>,
) {
    for unit in units {
        deliver(
            engine,
            ConsensusMessage::Unit(UnitMessage {
                holder: ValidatorId(holder),
                block: block.id,
                slot: block.slot,
                unit,
            }),
        );
    }
}

fn vote(
    engine: &mut ConsensusEngine,
    voter: u32,
    block: &Block,
    round: Round,
) -> Vec<EngineOutput> {
    deliver(
        engine,
        ConsensusMessage::Vote(Vote::new(ValidatorId(voter), block.id, block.slot, round)),
    )
}

fn rejections(outputs: &[EngineOutput]) -> Vec<&Rejection> {
    outputs
        .iter()
        .filter_map(|o| match o {
            EngineOutput::Rejected(r) => Some(r),
            _ => None,
        })
        .collect()
}

fn finalized(outputs: &[EngineOutput]) -> Option<&FinalizeEvent> {
    outputs.iter().find_map(|o| match o {
        EngineOutput::Finalized(event) => Some(event),
        _ => None,
    })
}

// === Scenario 1: honest fast path ===

#[test]
fn honest_leader_finalizes_in_round_one() {
    common::init_tracing();
    let mut engine = ConsensusEngine::observer(five_validators(), config()).unwrap();
    let b = Block::from_payload(Slot(0), ValidatorId(1), b"B");

    deliver(&mut engine, ConsensusMessage::Proposal(b));
    for v in 2..=5 {
        give_units(&mut engine, v, &b, 0..5);
    }
    for v in 1..=5 {
        assert!(engine.disseminator().is_received(&ValidatorId(v), Slot(0), &b.id));
    }

    for v in 1..=3 {
        let out = vote(&mut engine, v, &b, Round::Round1);
        assert!(finalized(&out).is_none());
    }
    let out = vote(&mut engine, 4, &b, Round::Round1);
    let event = finalized(&out).expect("fast quorum reached");
    assert_eq!(event.slot, Slot(0));
    assert_eq!(event.block, b.id);
    assert_eq!(event.round, Round::Round1);
    assert_eq!(event.certificate.threshold(), Threshold::Fast);
    assert_eq!(event.certificate.stake, 4);

    assert_eq!(engine.ledger().outcome(Slot(0)), Some(Outcome::Finalized(b.id)));
    assert_eq!(engine.slot(), Slot(1));

    // The fifth vote arrives after the slot closed.
    let out = vote(&mut engine, 5, &b, Round::Round1);
    assert!(matches!(rejections(&out)[..], [Rejection::StaleMessage { .. }]));
}

// === Scenario 2: silent Byzantine leader ===

#[test]
fn silent_leader_slot_is_skipped() {
    common::init_tracing();
    // v5 first in table order leads slot 0.
    let table = StakeTable::new(
        [5, 1, 2, 3, 4]
            .into_iter()
            .map(|i| Validator::new(ValidatorId(i), 1))
            .collect(),
    )
    .unwrap();
    let mut engine = ConsensusEngine::observer(table, config()).unwrap();
    assert_eq!(engine.leader(), ValidatorId(5));

    engine.handle(Event::Tick(100));
    assert_eq!(engine.phase(), SlotPhase::AwaitingProposal);
    engine.handle(Event::Tick(300));
    assert_eq!(engine.phase(), SlotPhase::SkipPending);

    let mut outputs = Vec::new();
    for v in 1..=3 {
        outputs = deliver(
            &mut engine,
            ConsensusMessage::SkipVote(SkipVote::new(ValidatorId(v), Slot(0))),
        );
    }
    let skipped = outputs
        .iter()
        .find_map(|o| match o {
            EngineOutput::Skipped(event) => Some(event),
            _ => None,
        })
        .expect("skip quorum reached");
    assert_eq!(skipped.slot, Slot(0));
    assert_eq!(skipped.certificate.stake, 3);
    assert!(engine.ledger().is_skipped(Slot(0)));
    assert_eq!(engine.slot(), Slot(1));
    assert_eq!(engine.leader(), ValidatorId(1));
}

// === Scenario 3: fallback path ===

#[test]
fn three_round_one_votes_fall_back_to_round_two() {
    common::init_tracing();
    let mut engine = ConsensusEngine::observer(five_validators(), config()).unwrap();
    let b = Block::from_payload(Slot(0), ValidatorId(1), b"B");

    deliver(&mut engine, ConsensusMessage::Proposal(b));
    for v in 2..=5 {
        give_units(&mut engine, v, &b, 0..5);
    }
    for v in 1..=3 {
        vote(&mut engine, v, &b, Round::Round1);
    }
    assert_eq!(engine.votor_phase(Slot(0)), Some(VotorPhase::Round1Collecting));

    engine.handle(Event::Tick(99));
    assert_eq!(engine.round(), Round::Round1);
    engine.handle(Event::Tick(100));
    assert_eq!(engine.round(), Round::Round2);
    assert_eq!(engine.phase(), SlotPhase::Round2);

    // A round-1 vote is now stale.
    let out = vote(&mut engine, 4, &b, Round::Round1);
    assert!(matches!(rejections(&out)[..], [Rejection::StaleRound { .. }]));

    for v in [1, 2, 4] {
        let out = vote(&mut engine, v, &b, Round::Round2);
        if v == 4 {
            let event = finalized(&out).expect("fallback quorum reached");
            assert_eq!(event.round, Round::Round2);
            assert_eq!(event.certificate.threshold(), Threshold::Fallback);
        }
    }
    assert_eq!(engine.ledger().finalized_block(Slot(0)), Some(b.id));
    assert_eq!(engine.votor_phase(Slot(0)), Some(VotorPhase::FallbackFinalized));
}

// === Scenario 4: reconstruction gate ===

#[test]
fn vote_waits_for_reconstruction() {
    common::init_tracing();
    let mut engine = ConsensusEngine::observer(five_validators(), config()).unwrap();
    let b = Block::from_payload(Slot(0), ValidatorId(1), b"B");
    deliver(&mut engine, ConsensusMessage::Proposal(b));

    give_units(&mut engine, 2, &b, 0..3);
    assert_eq!(engine.disseminator().units(&ValidatorId(2), Slot(0), &b.id), 3);

    let out = vote(&mut engine, 2, &b, Round::Round1);
    assert_eq!(
        rejections(&out),
        vec![&Rejection::InsufficientReconstruction {
            validator: ValidatorId(2),
            block: b.id,
            units: 3,
            required: 4,
        }]
    );
    let votor = engine.votor(Slot(0)).unwrap();
    assert!(!votor.has_voted(&ValidatorId(2), Round::Round1));

    // The fourth unit unblocks the held vote.
    let out = deliver(
        &mut engine,
        ConsensusMessage::Unit(UnitMessage {
            holder: ValidatorId(2),
            block: b.id,
            slot: Slot(0),
            unit: 3,
        }),
    );
    assert!(rejections(&out).is_empty());
    let votor = engine.votor(Slot(0)).unwrap();
    assert!(votor.has_voted(&ValidatorId(2), Round::Round1));
    assert_eq!(votor.accepted_votes().count(), 1);
    assert_eq!(votor.accepted_votes().next().unwrap().units_at_acceptance, 4);
}

#[test]
fn vote_succeeds_when_retried_after_reconstruction() {
    let mut engine = ConsensusEngine::observer(
        five_validators(),
        EngineConfig {
            max_pending: 1,
            ..config()
        },
    )
    .unwrap();
    let b = Block::from_payload(Slot(0), ValidatorId(1), b"B");
    deliver(&mut engine, ConsensusMessage::Proposal(b));
    give_units(&mut engine, 3, &b, 0..3);
    vote(&mut engine, 3, &b, Round::Round1);

    // Push the held vote out of the one-slot buffer.
    give_units(&mut engine, 4, &b, 0..1);
    vote(&mut engine, 4, &b, Round::Round1);

    give_units(&mut engine, 3, &b, 3..4);
    assert!(!engine.votor(Slot(0)).unwrap().has_voted(&ValidatorId(3), Round::Round1));

    let out = vote(&mut engine, 3, &b, Round::Round1);
    assert!(rejections(&out).is_empty());
    assert!(engine.votor(Slot(0)).unwrap().has_voted(&ValidatorId(3), Round::Round1));
}

// === Misattributed units ===

#[test]
fn unit_claiming_another_slot_does_not_block_the_proposal() {
    common::init_tracing();
    let mut engine = ConsensusEngine::new(ValidatorId(2), five_validators(), config()).unwrap();
    let b = Block::from_payload(Slot(0), ValidatorId(1), b"B");

    // v5 announces a unit of B for slot 1 before the leader's proposal lands.
    let out = deliver(
        &mut engine,
        ConsensusMessage::Unit(UnitMessage {
            holder: ValidatorId(5),
            block: b.id,
            slot: Slot(1),
            unit: 0,
        }),
    );
    assert!(rejections(&out).is_empty());

    let out = deliver(&mut engine, ConsensusMessage::Proposal(b));
    assert!(rejections(&out).is_empty());
    assert_eq!(engine.proposal(Slot(0)), Some(&b));
    assert_eq!(engine.phase(), SlotPhase::Round1);

    // v2's own units go through and it votes.
    let mut outputs = Vec::new();
    for unit in 0..4 {
        outputs.extend(deliver(
            &mut engine,
            ConsensusMessage::Unit(UnitMessage {
                holder: ValidatorId(2),
                block: b.id,
                slot: Slot(0),
                unit,
            }),
        ));
    }
    assert!(rejections(&outputs).is_empty());
    assert!(outputs.contains(&EngineOutput::Broadcast(ConsensusMessage::Vote(Vote::new(
        ValidatorId(2),
        b.id,
        Slot(0),
        Round::Round1
    )))));

    for v in [3, 4] {
        give_units(&mut engine, v, &b, 0..4);
    }
    vote(&mut engine, 1, &b, Round::Round1);
    vote(&mut engine, 3, &b, Round::Round1);
    let out = vote(&mut engine, 4, &b, Round::Round1);
    let event = finalized(&out).expect("fast quorum reached");
    assert_eq!(event.block, b.id);
    assert_eq!(engine.ledger().finalized_block(Slot(0)), Some(b.id));

    // The stray claim stayed confined to slot 1.
    let disseminator = engine.disseminator();
    assert_eq!(disseminator.units(&ValidatorId(5), Slot(1), &b.id), 1);
    assert_eq!(disseminator.units(&ValidatorId(5), Slot(0), &b.id), 0);
}

// === Scenario 5: equivocation ===

#[test]
fn equivocating_vote_is_rejected_and_not_counted() {
    common::init_tracing();
    let mut engine = ConsensusEngine::observer(five_validators(), config()).unwrap();
    let b = Block::from_payload(Slot(0), ValidatorId(1), b"B");
    let c = Block::from_payload(Slot(0), ValidatorId(1), b"C");
    deliver(&mut engine, ConsensusMessage::Proposal(b));
    give_units(&mut engine, 2, &b, 0..5);
    give_units(&mut engine, 2, &c, 0..5);

    assert!(rejections(&vote(&mut engine, 2, &b, Round::Round1)).is_empty());
    let out = vote(&mut engine, 2, &c, Round::Round1);
    let rejected = rejections(&out);
    assert_eq!(
        rejected,
        vec![&Rejection::DuplicateOrConflictingVote {
            validator: ValidatorId(2),
            slot: Slot(0),
            round: Round::Round1,
            recorded: b.id,
            attempted: c.id,
        }]
    );
    assert!(rejected[0].is_protocol_violation());

    let votor = engine.votor(Slot(0)).unwrap();
    assert_eq!(votor.voters(&b.id, Round::Round1).map(|s| s.len()), Some(1));
    assert!(votor.voters(&c.id, Round::Round1).is_none());
    assert_eq!(engine.evidence().len(), 1);
    assert_eq!(engine.evidence()[0].validator(), ValidatorId(2));

    // Exact redelivery is a duplicate, not a violation.
    let out = vote(&mut engine, 2, &b, Round::Round1);
    assert!(!rejections(&out)[0].is_protocol_violation());
    assert_eq!(engine.evidence().len(), 1);
}

// === Idempotence ===

#[test]
fn quorum_check_returns_the_same_certificate() {
    let mut engine = ConsensusEngine::observer(five_validators(), config()).unwrap();
    let b = Block::from_payload(Slot(0), ValidatorId(1), b"B");
    deliver(&mut engine, ConsensusMessage::Proposal(b));
    for v in 2..=4 {
        give_units(&mut engine, v, &b, 0..4);
    }
    for v in 1..=4 {
        vote(&mut engine, v, &b, Round::Round1);
    }

    let formed = engine.votor(Slot(0)).unwrap().certificate().cloned().unwrap();
    let mut votor = engine.votor(Slot(0)).unwrap().clone();
    let again = votor.check_quorum(&b.id, Round::Round1, engine.quorum());
    assert_eq!(again, Some(formed));
    let other = Block::from_payload(Slot(0), ValidatorId(1), b"other");
    assert_eq!(votor.check_quorum(&other.id, Round::Round1, engine.quorum()), None);
}
