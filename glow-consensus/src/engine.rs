//! Per-validator consensus engine.
//!
//! Composes the disseminator, votor, skip manager and scheduler behind a
//! single event-driven entry point, [`ConsensusEngine::handle`]. Each event is
//! processed to completion before the next; the engine never blocks.
//!
//! Messages that arrive early (a vote before the voter's reconstruction is
//! visible, a round-2 vote during round 1, a message for a slot a little
//! ahead) are held and replayed whenever the engine makes progress.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use glow_core::{
    Block, Certificate, Error, FinalizedLedger, LedgerEntry, Outcome, QuorumCalculator,
    QuorumCertificate, Result, Round, SkipCertificate, SkipVote, Slot, StakeTable, ValidatorId,
    Vote,
};
use glow_verify::{
    ProtocolInvariants, ProtocolState, ReconstructionRecord, RoundRecord, VoteRecord,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::config::EngineConfig;
use crate::dissemination::{Disseminator, RelayPlan, UnitOutcome};
use crate::message::{ConsensusMessage, UnitMessage};
use crate::rejection::{ProposalFault, Rejection};
use crate::scheduler::{Deadline, LeaderSchedule, SlotPhase, SlotScheduler};
use crate::skip::SkipManager;
use crate::votor::{EquivocationEvidence, Votor, VotorPhase};

/// An input from a collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A message delivered by the network.
    Message(ConsensusMessage),
    /// Logical clock tick.
    Tick(u64),
    /// Block built by the local proposal collaborator.
    Propose(Block),
}

/// A block became final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeEvent {
    /// Decided slot.
    pub slot: Slot,
    /// Finalized block.
    pub block: glow_core::BlockId,
    /// Round that produced the certificate.
    pub round: Round,
    /// The certificate.
    pub certificate: QuorumCertificate,
}

/// A slot was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipEvent {
    /// Decided slot.
    pub slot: Slot,
    /// The certificate.
    pub certificate: SkipCertificate,
}

/// An output for a collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutput {
    /// Message for the transport layer to broadcast.
    Broadcast(ConsensusMessage),
    /// Finalize event for the application layer.
    Finalized(FinalizeEvent),
    /// Skip event for the application layer.
    Skipped(SkipEvent),
    /// Refused input, for observability.
    Rejected(Rejection),
    /// A new slot started.
    SlotStarted {
        /// The new slot.
        slot: Slot,
        /// Its leader.
        leader: ValidatorId,
    },
}

/// Engine statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Current slot.
    pub slot: Slot,
    /// Current round.
    pub round: Round,
    /// Current slot phase.
    pub phase: SlotPhase,
    /// Round-1 votes accepted in the current slot.
    pub round1_votes: usize,
    /// Round-2 votes accepted in the current slot.
    pub round2_votes: usize,
    /// Skip votes accepted across all slots.
    pub skip_votes: usize,
    /// Slots finalized.
    pub finalized: u64,
    /// Slots skipped.
    pub skipped: u64,
    /// Inputs rejected.
    pub rejected: u64,
    /// Messages held for later.
    pub pending: usize,
}

/// One validator's (or an observer's) consensus state.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    local: Option<ValidatorId>,
    config: EngineConfig,
    quorum: QuorumCalculator,
    scheduler: SlotScheduler,
    disseminator: Disseminator,
    votors: BTreeMap<Slot, Votor>,
    skips: SkipManager,
    ledger: FinalizedLedger,
    proposals: BTreeMap<Slot, Block>,
    fast_at_round2: BTreeMap<Slot, bool>,
    pending: VecDeque<ConsensusMessage>,
    pending_set: HashSet<ConsensusMessage>,
    replay: bool,
    now: u64,
    rejected: u64,
}

impl ConsensusEngine {
    /// Create the engine of validator `local`.
    pub fn new(local: ValidatorId, table: StakeTable, config: EngineConfig) -> Result<Self> {
        let schedule = config.leader_schedule.build();
        Self::with_schedule(Some(local), table, config, schedule)
    }

    /// Create an engine that tracks finality without voting.
    pub fn observer(table: StakeTable, config: EngineConfig) -> Result<Self> {
        let schedule = config.leader_schedule.build();
        Self::with_schedule(None, table, config, schedule)
    }

    /// Create an engine with a custom leader schedule.
    pub fn with_schedule(
        local: Option<ValidatorId>,
        table: StakeTable,
        config: EngineConfig,
        schedule: Arc<dyn LeaderSchedule>,
    ) -> Result<Self> {
        config.validate(table.len())?;
        let quorum = QuorumCalculator::new(table)?;
        if let Some(id) = local {
            if !quorum.table().contains(&id) {
                return Err(Error::invalid_config(format!(
                    "local validator {} is not in the stake table",
                    id
                )));
            }
        }
        let disseminator = Disseminator::new(config.units_for(quorum.table().len()))?
            .with_block_limit(config.max_blocks_per_slot);
        let scheduler = SlotScheduler::new(quorum.shared_table(), schedule, &config, 0);

        let mut votors = BTreeMap::new();
        votors.insert(scheduler.slot(), Votor::new(scheduler.slot()));

        info!(
            "Starting engine for {} with {} validators, stake {}, {} units per block",
            local.map_or_else(|| "observer".to_string(), |id| id.to_string()),
            quorum.table().len(),
            quorum.total_stake(),
            disseminator.total_units()
        );

        Ok(Self {
            local,
            config,
            quorum,
            scheduler,
            disseminator,
            votors,
            skips: SkipManager::new(),
            ledger: FinalizedLedger::new(),
            proposals: BTreeMap::new(),
            fast_at_round2: BTreeMap::new(),
            pending: VecDeque::new(),
            pending_set: HashSet::new(),
            replay: false,
            now: 0,
            rejected: 0,
        })
    }

    /// Process one event to completion.
    ///
    /// # Panics
    ///
    /// Panics if the engine's own state violates a protocol invariant. That
    /// indicates a bug, never bad input.
    pub fn handle(&mut self, event: Event) -> Vec<EngineOutput> {
        let mut out = Vec::new();
        match event {
            Event::Message(message) => self.dispatch(message, false, &mut out),
            Event::Tick(now) => self.on_tick(now, &mut out),
            Event::Propose(block) => self.propose(block, &mut out),
        }
        self.drain_pending(&mut out);
        if self.config.check_invariants {
            if let Err(violation) = ProtocolInvariants::all().check(self) {
                panic!("internal invariant violated: {}", violation);
            }
        }
        out
    }

    fn dispatch(&mut self, message: ConsensusMessage, replayed: bool, out: &mut Vec<EngineOutput>) {
        let current = self.scheduler.slot();
        let slot = message.slot();
        if slot > current && !matches!(message, ConsensusMessage::Unit(_)) {
            if slot.number() - current.number() > self.config.max_future_slots {
                self.reject(Rejection::FutureSlot { slot, current }, replayed, out);
            } else {
                trace!("Holding {} while at {}", message, current);
                self.park(message);
            }
            return;
        }

        let result = match &message {
            ConsensusMessage::Proposal(block) => self.on_proposal(*block, out),
            ConsensusMessage::Unit(unit) => self.on_unit(*unit, out),
            ConsensusMessage::Vote(vote) => self.on_vote(*vote, out),
            ConsensusMessage::SkipVote(vote) => self.on_skip_vote(*vote, out),
            ConsensusMessage::Certificate(cert) => self.on_certificate(cert.clone(), out),
        };
        if let Err(rejection) = result {
            let retry = rejection.is_retryable();
            self.reject(rejection, replayed, out);
            if retry {
                self.park(message);
            }
        }
    }

    fn reject(&mut self, rejection: Rejection, replayed: bool, out: &mut Vec<EngineOutput>) {
        // Already reported when first delivered.
        if replayed {
            return;
        }
        self.rejected += 1;
        if rejection.is_protocol_violation() {
            warn!("Rejected: {}", rejection);
        } else {
            trace!("Rejected: {}", rejection);
        }
        out.push(EngineOutput::Rejected(rejection));
    }

    fn park(&mut self, message: ConsensusMessage) {
        if self.pending_set.contains(&message) {
            return;
        }
        if self.pending.len() >= self.config.max_pending {
            if let Some(dropped) = self.pending.pop_front() {
                debug!("Pending buffer full, dropping {}", dropped);
                self.pending_set.remove(&dropped);
            }
        }
        self.pending_set.insert(message.clone());
        self.pending.push_back(message);
    }

    fn drain_pending(&mut self, out: &mut Vec<EngineOutput>) {
        while self.replay && !self.pending.is_empty() {
            self.replay = false;
            let batch: Vec<ConsensusMessage> = self.pending.drain(..).collect();
            self.pending_set.clear();
            trace!("Replaying {} held messages", batch.len());
            for message in batch {
                self.dispatch(message, true, out);
            }
        }
        self.replay = false;
    }

    fn on_proposal(
        &mut self,
        block: Block,
        out: &mut Vec<EngineOutput>,
    ) -> std::result::Result<(), Rejection> {
        let current = self.scheduler.slot();
        if block.slot < current {
            return Err(Rejection::StaleMessage {
                slot: block.slot,
                current,
            });
        }
        if !self.quorum.table().contains(&block.proposer) {
            return Err(Rejection::UnknownValidator(block.proposer));
        }
        let leader = self.scheduler.leader();
        if block.proposer != leader {
            return Err(Rejection::InvalidProposal {
                slot: block.slot,
                proposer: block.proposer,
                fault: ProposalFault::WrongLeader { expected: leader },
            });
        }
        if let Some(existing) = self.proposals.get(&current) {
            if *existing == block {
                trace!("Ignoring repeated proposal {}", block.id);
                return Ok(());
            }
            return Err(Rejection::InvalidProposal {
                slot: block.slot,
                proposer: block.proposer,
                fault: ProposalFault::AlreadyProposed {
                    existing: existing.id,
                },
            });
        }
        if self.scheduler.phase() == SlotPhase::SkipPending {
            return Err(Rejection::InvalidProposal {
                slot: block.slot,
                proposer: block.proposer,
                fault: ProposalFault::SlotExpired,
            });
        }

        // The proposer built the block, so it holds every unit.
        self.disseminator
            .mark_complete(block.proposer, block.id, block.slot);
        self.proposals.insert(current, block);
        self.scheduler.record_proposal();
        self.replay = true;
        info!(
            "Recorded proposal {} for {} from {}",
            block.id, current, block.proposer
        );

        self.maybe_enter_round1(out);
        self.try_local_votes(out);
        Ok(())
    }

    fn propose(&mut self, block: Block, out: &mut Vec<EngineOutput>) {
        let current = self.scheduler.slot();
        let is_local_leader = self.local == Some(block.proposer)
            && self.scheduler.leader() == block.proposer
            && block.slot == current;
        if !is_local_leader {
            self.reject(
                Rejection::InvalidProposal {
                    slot: block.slot,
                    proposer: block.proposer,
                    fault: ProposalFault::NotLocalLeader,
                },
                false,
                out,
            );
            return;
        }

        let mark = out.len();
        match self.on_proposal(block, out) {
            Ok(()) => {
                debug!("Proposing {} for {}", block.id, current);
                out.insert(mark, EngineOutput::Broadcast(ConsensusMessage::Proposal(block)));
            }
            Err(rejection) => self.reject(rejection, false, out),
        }
    }

    fn on_unit(
        &mut self,
        unit: UnitMessage,
        out: &mut Vec<EngineOutput>,
    ) -> std::result::Result<(), Rejection> {
        let current = self.scheduler.slot();
        if unit.slot < current {
            return Err(Rejection::StaleMessage {
                slot: unit.slot,
                current,
            });
        }
        if unit.slot.number() - current.number() > self.config.max_future_slots {
            return Err(Rejection::FutureSlot {
                slot: unit.slot,
                current,
            });
        }
        if !self.quorum.table().contains(&unit.holder) {
            return Err(Rejection::UnknownValidator(unit.holder));
        }

        let outcome = self
            .disseminator
            .record_unit(unit.holder, unit.block, unit.slot, unit.unit)?;
        let is_new = matches!(outcome, UnitOutcome::Recorded | UnitOutcome::NowReceived);
        if is_new && self.local == Some(unit.holder) {
            out.push(EngineOutput::Broadcast(ConsensusMessage::Unit(unit)));
        }
        if outcome == UnitOutcome::NowReceived {
            self.replay = true;
            if unit.slot == current {
                self.maybe_enter_round1(out);
                self.try_local_votes(out);
            }
        }
        Ok(())
    }

    fn on_vote(
        &mut self,
        vote: Vote,
        out: &mut Vec<EngineOutput>,
    ) -> std::result::Result<(), Rejection> {
        let current = self.scheduler.slot();
        if vote.slot < current {
            return Err(Rejection::StaleMessage {
                slot: vote.slot,
                current,
            });
        }
        if !self.quorum.table().contains(&vote.validator) {
            return Err(Rejection::UnknownValidator(vote.validator));
        }
        if self.scheduler.phase() == SlotPhase::SkipPending {
            return Err(Rejection::VotingClosed { slot: current });
        }

        let votor = self
            .votors
            .entry(current)
            .or_insert_with(|| Votor::new(current));
        votor.cast_vote(vote, &self.disseminator)?;
        if let Some(cert) = votor.check_quorum(&vote.block, vote.round, &self.quorum) {
            self.finalize(cert, out);
        }
        Ok(())
    }

    fn on_skip_vote(
        &mut self,
        vote: SkipVote,
        out: &mut Vec<EngineOutput>,
    ) -> std::result::Result<(), Rejection> {
        let current = self.scheduler.slot();
        if vote.slot < current {
            return Err(Rejection::StaleMessage {
                slot: vote.slot,
                current,
            });
        }
        if !self.quorum.table().contains(&vote.validator) {
            return Err(Rejection::UnknownValidator(vote.validator));
        }

        let timed_out = self.scheduler.phase() == SlotPhase::SkipPending;
        self.skips
            .cast_skip_vote(vote, timed_out, &self.disseminator)?;
        if let Some(cert) = self
            .skips
            .check_skip_quorum(vote.slot, &self.quorum, &self.ledger)
        {
            self.skip(cert, out);
        }
        Ok(())
    }

    fn on_certificate(
        &mut self,
        cert: Certificate,
        out: &mut Vec<EngineOutput>,
    ) -> std::result::Result<(), Rejection> {
        let slot = cert.slot();
        cert.verify(&self.quorum)
            .map_err(|source| Rejection::InvalidCertificate { slot, source })?;

        let outcome = match &cert {
            Certificate::Quorum(qc) => Outcome::Finalized(qc.block),
            Certificate::Skip(_) => Outcome::Skipped,
        };
        let current = self.scheduler.slot();
        if slot < current {
            return match self.ledger.check(slot, outcome) {
                Ok(()) => {
                    trace!("Certificate for decided {} already known", slot);
                    Ok(())
                }
                Err(conflict) => {
                    error!("Certificate contradicts ledger: {}", conflict);
                    Err(Rejection::ConflictingCertificate(conflict))
                }
            };
        }

        let recorded = match &cert {
            Certificate::Quorum(qc) => self.ledger.record_finalized(qc.clone()),
            Certificate::Skip(sc) => self.ledger.record_skip(sc.clone()),
        };
        if let Err(conflict) = recorded {
            error!("Certificate contradicts ledger: {}", conflict);
            return Err(Rejection::ConflictingCertificate(conflict));
        }

        info!("Adopted certificate: {} {}", slot, outcome);
        out.push(EngineOutput::Broadcast(ConsensusMessage::Certificate(cert.clone())));
        match cert {
            Certificate::Quorum(qc) => out.push(EngineOutput::Finalized(FinalizeEvent {
                slot,
                block: qc.block,
                round: qc.round,
                certificate: qc,
            })),
            Certificate::Skip(sc) => out.push(EngineOutput::Skipped(SkipEvent {
                slot,
                certificate: sc,
            })),
        }
        self.close_slot(out);
        Ok(())
    }

    fn on_tick(&mut self, now: u64, out: &mut Vec<EngineOutput>) {
        if now < self.now {
            trace!("Ignoring stale tick {} (now {})", now, self.now);
            return;
        }
        self.now = now;

        let slot = self.scheduler.slot();
        for deadline in self.scheduler.poll(now) {
            match deadline {
                Deadline::Round1 => self.enter_round2(out),
                Deadline::Round2 => {
                    self.votor_mut(slot).mark_unresolved();
                }
                Deadline::Slot => self.expire_slot(out),
            }
            if self.scheduler.slot() != slot {
                break;
            }
        }
    }

    fn maybe_enter_round1(&mut self, out: &mut Vec<EngineOutput>) {
        let slot = self.scheduler.slot();
        let Some(block) = self.proposals.get(&slot) else {
            return;
        };
        if !self.disseminator.received_by_anyone(slot, &block.id) {
            return;
        }
        if !self.scheduler.enter_round1() {
            return;
        }
        self.votor_mut(slot).start_round1();
        self.replay = true;

        // A late proposal may already be past the round-1 deadline.
        if self.now >= self.scheduler.deadlines().round1 {
            self.enter_round2(out);
        }
    }

    fn enter_round2(&mut self, out: &mut Vec<EngineOutput>) {
        let slot = self.scheduler.slot();
        let fast = self
            .votors
            .get(&slot)
            .map(|v| v.has_fast_quorum(&self.quorum))
            .unwrap_or(false);
        if !self.scheduler.expire_round1(self.now) {
            return;
        }
        self.fast_at_round2.insert(slot, fast);
        self.votor_mut(slot).start_round2();
        self.replay = true;
        info!("{} moving to round 2 at tick {}", slot, self.now);

        if self.now >= self.scheduler.deadlines().round2 {
            self.votor_mut(slot).mark_unresolved();
            return;
        }
        self.try_local_votes(out);
    }

    fn expire_slot(&mut self, out: &mut Vec<EngineOutput>) {
        if !self.scheduler.expire_slot() {
            return;
        }
        info!(
            "{} timed out at tick {} without a decision",
            self.scheduler.slot(),
            self.now
        );
        self.replay = true;
        self.try_local_votes(out);
    }

    /// Cast whatever vote the local validator owes in the current phase.
    fn try_local_votes(&mut self, out: &mut Vec<EngineOutput>) {
        let Some(local) = self.local else {
            return;
        };
        let slot = self.scheduler.slot();
        let proposal = self.proposals.get(&slot).map(|b| b.id);
        let Some(votor) = self.votors.get(&slot) else {
            return;
        };

        let message = match self.scheduler.phase() {
            SlotPhase::Round1 => {
                let Some(block) = proposal else {
                    return;
                };
                if votor.collecting_round() != Some(Round::Round1)
                    || votor.has_voted(&local, Round::Round1)
                    || !self.disseminator.is_received(&local, slot, &block)
                {
                    return;
                }
                ConsensusMessage::Vote(Vote::new(local, block, slot, Round::Round1))
            }
            SlotPhase::Round2 => {
                if votor.collecting_round() != Some(Round::Round2)
                    || votor.has_voted(&local, Round::Round2)
                {
                    return;
                }
                // Stay with the round-1 choice.
                let target = votor
                    .vote_of(&local, Round::Round1)
                    .map(|v| v.block)
                    .or(proposal);
                let Some(block) = target else {
                    return;
                };
                if !self.disseminator.is_received(&local, slot, &block) {
                    return;
                }
                ConsensusMessage::Vote(Vote::new(local, block, slot, Round::Round2))
            }
            SlotPhase::SkipPending => {
                if self.skips.has_voted(&local, slot)
                    || self.disseminator.received_any_in_slot(&local, slot)
                {
                    return;
                }
                ConsensusMessage::SkipVote(SkipVote::new(local, slot))
            }
            SlotPhase::AwaitingProposal | SlotPhase::Closed => return,
        };

        debug!("Casting {}", message);
        out.push(EngineOutput::Broadcast(message.clone()));
        self.dispatch(message, false, out);
    }

    fn finalize(&mut self, cert: QuorumCertificate, out: &mut Vec<EngineOutput>) {
        match self.ledger.record_finalized(cert.clone()) {
            Ok(true) => {}
            Ok(false) => return,
            Err(conflict) => panic!("internal invariant violated: {}", conflict),
        }
        info!(
            "Finalized {} in {} via {} with stake {}/{}",
            cert.block,
            cert.slot,
            cert.round,
            cert.stake,
            self.quorum.total_stake()
        );
        out.push(EngineOutput::Broadcast(ConsensusMessage::Certificate(
            cert.clone().into(),
        )));
        out.push(EngineOutput::Finalized(FinalizeEvent {
            slot: cert.slot,
            block: cert.block,
            round: cert.round,
            certificate: cert,
        }));
        self.close_slot(out);
    }

    fn skip(&mut self, cert: SkipCertificate, out: &mut Vec<EngineOutput>) {
        match self.ledger.record_skip(cert.clone()) {
            Ok(true) => {}
            Ok(false) => return,
            Err(conflict) => panic!("internal invariant violated: {}", conflict),
        }
        info!(
            "Skipped {} with stake {}/{}",
            cert.slot,
            cert.stake,
            self.quorum.total_stake()
        );
        out.push(EngineOutput::Broadcast(ConsensusMessage::Certificate(
            cert.clone().into(),
        )));
        out.push(EngineOutput::Skipped(SkipEvent {
            slot: cert.slot,
            certificate: cert,
        }));
        self.close_slot(out);
    }

    fn close_slot(&mut self, out: &mut Vec<EngineOutput>) {
        self.scheduler.close();
        let slot = self.scheduler.advance(self.now);
        let leader = self.scheduler.leader();
        self.votors.entry(slot).or_insert_with(|| Votor::new(slot));
        self.replay = true;
        info!("Advanced to {} with leader {}", slot, leader);
        out.push(EngineOutput::SlotStarted { slot, leader });
    }

    fn votor_mut(&mut self, slot: Slot) -> &mut Votor {
        self.votors.entry(slot).or_insert_with(|| Votor::new(slot))
    }

    /// Local validator, `None` for observers.
    pub fn local(&self) -> Option<ValidatorId> {
        self.local
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stake table and thresholds.
    pub fn quorum(&self) -> &QuorumCalculator {
        &self.quorum
    }

    /// The finalized ledger view.
    pub fn ledger(&self) -> &FinalizedLedger {
        &self.ledger
    }

    /// Current slot.
    pub fn slot(&self) -> Slot {
        self.scheduler.slot()
    }

    /// Current round.
    pub fn round(&self) -> Round {
        self.scheduler.round()
    }

    /// Current slot phase.
    pub fn phase(&self) -> SlotPhase {
        self.scheduler.phase()
    }

    /// Leader of the current slot.
    pub fn leader(&self) -> ValidatorId {
        self.scheduler.leader()
    }

    /// Leader of any slot.
    pub fn leader_for(&self, slot: Slot) -> ValidatorId {
        self.scheduler.leader_for(slot)
    }

    /// Whether the local validator leads the current slot.
    pub fn is_leader(&self) -> bool {
        self.local == Some(self.scheduler.leader())
    }

    /// Latest tick observed.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &SlotScheduler {
        &self.scheduler
    }

    /// Reconstruction tracking.
    pub fn disseminator(&self) -> &Disseminator {
        &self.disseminator
    }

    /// Vote collection of a slot.
    pub fn votor(&self, slot: Slot) -> Option<&Votor> {
        self.votors.get(&slot)
    }

    /// Phase of a slot's vote collection.
    pub fn votor_phase(&self, slot: Slot) -> Option<VotorPhase> {
        self.votors.get(&slot).map(Votor::phase)
    }

    /// Skip-vote collection.
    pub fn skips(&self) -> &SkipManager {
        &self.skips
    }

    /// Recorded proposal of a slot.
    pub fn proposal(&self, slot: Slot) -> Option<&Block> {
        self.proposals.get(&slot)
    }

    /// Equivocation evidence across all slots.
    pub fn evidence(&self) -> Vec<EquivocationEvidence> {
        self.votors
            .values()
            .flat_map(|v| v.evidence().iter().cloned())
            .collect()
    }

    /// Which validator relays which unit, for the transport layer.
    pub fn relay_plan(&self) -> Result<RelayPlan> {
        RelayPlan::assign(self.quorum.table(), self.disseminator.total_units())
    }

    /// Messages held for later processing.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Get statistics.
    pub fn stats(&self) -> EngineStats {
        let votes = self
            .votors
            .get(&self.scheduler.slot())
            .map(Votor::stats)
            .unwrap_or_default();
        let ledger = self.ledger.stats();
        EngineStats {
            slot: self.scheduler.slot(),
            round: self.scheduler.round(),
            phase: self.scheduler.phase(),
            round1_votes: votes.round1_votes,
            round2_votes: votes.round2_votes,
            skip_votes: self.skips.stats().votes,
            finalized: ledger.finalized(),
            skipped: ledger.skipped,
            rejected: self.rejected,
            pending: self.pending.len(),
        }
    }
}

impl ProtocolState for ConsensusEngine {
    fn quorum(&self) -> &QuorumCalculator {
        &self.quorum
    }

    fn ledger(&self) -> &FinalizedLedger {
        &self.ledger
    }

    fn current_slot(&self) -> Slot {
        self.scheduler.slot()
    }

    fn current_round(&self) -> Round {
        self.scheduler.round()
    }

    fn reconstruction_threshold(&self) -> u64 {
        self.disseminator.threshold()
    }

    fn accepted_votes(&self) -> Vec<VoteRecord> {
        self.votors
            .values()
            .flat_map(|v| v.accepted_votes())
            .map(|a| VoteRecord {
                vote: a.vote,
                units_at_acceptance: a.units_at_acceptance,
            })
            .collect()
    }

    fn reconstruction_states(&self) -> Vec<ReconstructionRecord> {
        self.disseminator
            .iter()
            .map(|((validator, slot, block), state)| ReconstructionRecord {
                validator: *validator,
                slot: *slot,
                block: *block,
                units: state.units(),
                received: state.is_received(),
            })
            .collect()
    }

    fn round_records(&self) -> Vec<RoundRecord> {
        self.scheduler
            .records()
            .into_iter()
            .map(|r| RoundRecord {
                slot: r.slot,
                round1_deadline: r.deadlines.round1,
                round2_entered_at: r.round2_entered_at,
                fast_quorum_at_round2: self.fast_at_round2.get(&r.slot).copied().unwrap_or(false),
            })
            .collect()
    }

    fn certificates(&self) -> Vec<Certificate> {
        let formed = self
            .votors
            .values()
            .filter_map(|v| v.certificate().cloned().map(Certificate::Quorum));
        let skipped = self.skips.certificates().cloned().map(Certificate::Skip);
        let recorded = self.ledger.iter().map(|(_, entry)| match entry {
            LedgerEntry::Finalized(qc) => Certificate::Quorum(qc.clone()),
            LedgerEntry::Skipped(sc) => Certificate::Skip(sc.clone()),
        });
        formed.chain(skipped).chain(recorded).collect()
    }

    fn now(&self) -> u64 {
        self.now
    }
}
