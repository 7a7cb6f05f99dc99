//! Multi-engine network harness.
//!
//! Every honest validator runs its own engine; messages travel through a
//! delivery queue with per-message delays picked from a choice tape. There is
//! no partition state in the engines: a partition is only a set of messages
//! withheld between two validator groups until the heal tick. Byzantine
//! validators run no engine; the harness scripts what they send.
//!
//! After every event each engine asserts its own invariants (the engines run
//! with `check_invariants` on), the harness checks the transition, and after
//! every tick all ledgers are compared.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use glow_consensus::{
    ConsensusEngine, ConsensusMessage, EngineConfig, EngineOutput, Event, RelayPlan, UnitMessage,
};
use glow_core::{Block, Round, SkipVote, Slot, StakeTable, ValidatorId, Vote};
use glow_verify::prelude::*;

/// Install a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What a Byzantine leader does with its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderBehavior {
    /// Never proposes.
    Silent,
    /// Proposes one block to half the validators and another to the rest.
    Equivocate,
}

/// Messages between `side` and everyone else are withheld in `[from, heal)`.
#[derive(Debug, Clone)]
pub struct Partition {
    pub side: BTreeSet<ValidatorId>,
    pub from: u64,
    pub heal: u64,
}

impl Partition {
    fn separates(&self, a: ValidatorId, b: ValidatorId) -> bool {
        self.side.contains(&a) != self.side.contains(&b)
    }
}

/// Network setup.
#[derive(Debug, Clone)]
pub struct Setup {
    pub validators: u32,
    pub stake: u64,
    pub byzantine: Vec<u32>,
    pub leader_behavior: LeaderBehavior,
    pub partition: Option<Partition>,
    /// Chance per thousand that a message is lost.
    pub drop_per_mille: u32,
    /// Delivery delay is `1..=max_delay` ticks.
    pub max_delay: u64,
    /// Choice tape for delays, drops and delivery order.
    pub choices: Vec<u32>,
}

impl Setup {
    pub fn honest(validators: u32) -> Self {
        Self {
            validators,
            stake: 1,
            byzantine: Vec::new(),
            leader_behavior: LeaderBehavior::Silent,
            partition: None,
            drop_per_mille: 0,
            max_delay: 10,
            choices: Vec::new(),
        }
    }
}

struct InFlight {
    at: u64,
    rank: u32,
    seq: u64,
    to: ValidatorId,
    message: ConsensusMessage,
}

pub const STEP: u64 = 10;

pub struct Network {
    pub engines: BTreeMap<ValidatorId, ConsensusEngine>,
    byzantine: BTreeSet<ValidatorId>,
    behavior: LeaderBehavior,
    partition: Option<Partition>,
    drop_per_mille: u32,
    max_delay: u64,
    choices: Vec<u32>,
    cursor: usize,
    queue: Vec<InFlight>,
    seq: u64,
    now: u64,
    plan: RelayPlan,
    total_units: u32,
    proposed: HashSet<Slot>,
    byzantine_voted: HashSet<Slot>,
    invariants: ProtocolInvariants,
    pub check_transitions: bool,
    pub delivered: u64,
    pub dropped: u64,
    pub rejections: u64,
}

impl Network {
    pub fn new(setup: Setup) -> Self {
        let table = StakeTable::uniform(setup.validators, setup.stake).unwrap();
        let config = EngineConfig {
            check_invariants: true,
            ..Default::default()
        };
        let byzantine: BTreeSet<ValidatorId> =
            setup.byzantine.iter().copied().map(ValidatorId).collect();
        let engines: BTreeMap<ValidatorId, ConsensusEngine> = table
            .ids()
            .filter(|id| !byzantine.contains(id))
            .map(|id| {
                let engine = ConsensusEngine::new(id, table.clone(), config.clone()).unwrap();
                (id, engine)
            })
            .collect();
        let total_units = config.units_for(table.len());
        let plan = RelayPlan::assign(&table, total_units).unwrap();

        let mut network = Self {
            engines,
            byzantine,
            behavior: setup.leader_behavior,
            partition: setup.partition,
            drop_per_mille: setup.drop_per_mille,
            max_delay: setup.max_delay.max(1),
            choices: setup.choices,
            cursor: 0,
            queue: Vec::new(),
            seq: 0,
            now: 0,
            plan,
            total_units,
            proposed: HashSet::new(),
            byzantine_voted: HashSet::new(),
            // Engines assert the state invariants themselves.
            invariants: ProtocolInvariants::new().require_monotonic_transitions(),
            check_transitions: true,
            delivered: 0,
            dropped: 0,
            rejections: 0,
        };
        let first = network.any_engine().leader_for(Slot::GENESIS);
        if let Some(block) = network.start_slot(first, Slot::GENESIS, first) {
            network.apply(first, Event::Propose(block));
        }
        network
    }

    fn any_engine(&self) -> &ConsensusEngine {
        self.engines.values().next().unwrap()
    }

    fn choice(&mut self) -> u32 {
        if self.choices.is_empty() {
            return 0;
        }
        let c = self.choices[self.cursor % self.choices.len()];
        self.cursor += 1;
        c
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn is_byzantine(&self, id: ValidatorId) -> bool {
        self.byzantine.contains(&id)
    }

    pub fn engine(&self, id: u32) -> &ConsensusEngine {
        &self.engines[&ValidatorId(id)]
    }

    fn send(&mut self, from: ValidatorId, to: ValidatorId, message: ConsensusMessage) {
        if !self.engines.contains_key(&to) {
            return;
        }
        if self.drop_per_mille > 0 && self.choice() % 1000 < self.drop_per_mille {
            self.dropped += 1;
            return;
        }
        let delay = 1 + u64::from(self.choice()) % self.max_delay;
        let mut at = self.now + delay;
        if let Some(p) = &self.partition {
            if p.separates(from, to) && self.now >= p.from && self.now < p.heal {
                at = at.max(p.heal);
            }
        }
        let rank = self.choice();
        self.seq += 1;
        self.queue.push(InFlight {
            at,
            rank,
            seq: self.seq,
            to,
            message,
        });
    }

    fn broadcast(&mut self, from: ValidatorId, message: ConsensusMessage) {
        let targets: Vec<ValidatorId> = self
            .engines
            .keys()
            .copied()
            .filter(|id| *id != from)
            .collect();
        for to in targets {
            self.send(from, to, message.clone());
        }
    }

    /// Relay each unit of `block` to `targets`, through the relay plan.
    /// Byzantine relays withhold their units.
    fn disseminate(&mut self, block: &Block, targets: &[ValidatorId]) {
        for unit in 0..self.total_units {
            let Some(relay) = self.plan.relay_for(unit) else {
                continue;
            };
            if self.byzantine.contains(&relay) {
                continue;
            }
            for to in targets {
                if *to == block.proposer {
                    continue;
                }
                let message = ConsensusMessage::Unit(UnitMessage {
                    holder: *to,
                    block: block.id,
                    slot: block.slot,
                    unit,
                });
                self.send(relay, *to, message);
            }
        }
    }

    /// React to `from` entering `slot`. Returns the block an honest leader
    /// should propose.
    fn start_slot(&mut self, from: ValidatorId, slot: Slot, leader: ValidatorId) -> Option<Block> {
        if self.byzantine.contains(&leader) {
            if self.proposed.insert(slot) {
                self.byzantine_leader(slot, leader);
            }
            return None;
        }
        if from != leader || !self.proposed.insert(slot) {
            return None;
        }
        Some(Block::from_payload(slot, leader, &slot.number().to_le_bytes()))
    }

    fn byzantine_leader(&mut self, slot: Slot, leader: ValidatorId) {
        if self.behavior == LeaderBehavior::Silent {
            return;
        }
        let honest: Vec<ValidatorId> = self.engines.keys().copied().collect();
        let (left, right) = honest.split_at(honest.len() / 2 + 1);
        let a = Block::from_payload(slot, leader, b"byzantine-a");
        let b = Block::from_payload(slot, leader, b"byzantine-b");
        for (block, side) in [(a, left.to_vec()), (b, right.to_vec())] {
            for to in &side {
                self.send(leader, *to, ConsensusMessage::Proposal(block));
                for unit in 0..self.total_units {
                    let message = ConsensusMessage::Unit(UnitMessage {
                        holder: *to,
                        block: block.id,
                        slot,
                        unit,
                    });
                    self.send(leader, *to, message);
                }
            }
        }
        self.byzantine_votes(&a);
    }

    /// Byzantine voters claim every unit, vote for the block and for a block
    /// of their own in both rounds, and ask to skip.
    fn byzantine_votes(&mut self, block: &Block) {
        if !self.byzantine_voted.insert(block.slot) {
            return;
        }
        let voters: Vec<ValidatorId> = self.byzantine.iter().copied().collect();
        for voter in voters {
            let fake = Block::from_payload(block.slot, voter, b"equivocation");
            for target in [block.id, fake.id] {
                for unit in 0..self.total_units {
                    let message = ConsensusMessage::Unit(UnitMessage {
                        holder: voter,
                        block: target,
                        slot: block.slot,
                        unit,
                    });
                    self.broadcast(voter, message);
                }
                for round in [Round::Round1, Round::Round2] {
                    let vote = Vote::new(voter, target, block.slot, round);
                    self.broadcast(voter, ConsensusMessage::Vote(vote));
                }
            }
            let skip = SkipVote::new(voter, block.slot);
            self.broadcast(voter, ConsensusMessage::SkipVote(skip));
        }
    }

    /// Feed one event to one engine and route everything it emits.
    pub fn apply(&mut self, to: ValidatorId, event: Event) {
        let mut work = VecDeque::from([(to, event)]);
        while let Some((id, event)) = work.pop_front() {
            let Some(engine) = self.engines.get_mut(&id) else {
                continue;
            };
            let before = self.check_transitions.then(|| engine.clone());
            let outputs = engine.handle(event);
            if let Some(before) = before {
                let after = &self.engines[&id];
                if let Err(violation) = verify_transition(&before, after, &self.invariants) {
                    panic!("{} transition: {}", id, violation);
                }
            }

            for output in outputs {
                match output {
                    EngineOutput::Broadcast(message) => {
                        if let ConsensusMessage::Proposal(block) = &message {
                            let targets: Vec<ValidatorId> = self.engines.keys().copied().collect();
                            self.disseminate(block, &targets);
                            self.byzantine_votes(block);
                        }
                        self.broadcast(id, message);
                    }
                    EngineOutput::SlotStarted { slot, leader } => {
                        if let Some(block) = self.start_slot(id, slot, leader) {
                            work.push_back((leader, Event::Propose(block)));
                        }
                    }
                    EngineOutput::Rejected(_) => self.rejections += 1,
                    EngineOutput::Finalized(_) | EngineOutput::Skipped(_) => {}
                }
            }
        }
    }

    /// Advance time in steps of [`STEP`] ticks until `until`.
    pub fn run_until(&mut self, until: u64) {
        while self.now < until {
            self.now += STEP;

            let now = self.now;
            let (mut due, rest): (Vec<InFlight>, Vec<InFlight>) =
                self.queue.drain(..).partition(|m| m.at <= now);
            self.queue = rest;
            due.sort_by_key(|m| (m.at, m.rank, m.seq));
            for message in due {
                self.delivered += 1;
                self.apply(message.to, Event::Message(message.message));
            }

            let ids: Vec<ValidatorId> = self.engines.keys().copied().collect();
            for id in ids {
                self.apply(id, Event::Tick(now));
            }

            if let Err(violation) = self.agreement() {
                panic!("at tick {}: {}", now, violation);
            }
        }
    }

    pub fn agreement(&self) -> Result<AgreementReport, InvariantViolation> {
        check_agreement(self.engines.iter().map(|(id, engine)| (*id, engine)))
    }

    /// Lowest slot every honest engine has reached.
    pub fn min_slot(&self) -> Slot {
        self.engines
            .values()
            .map(|e| e.slot())
            .min()
            .unwrap_or(Slot::GENESIS)
    }
}
