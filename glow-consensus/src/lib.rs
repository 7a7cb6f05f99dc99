//! Dual-path slot finalization for glow validators.
//!
//! Each validator runs one [`ConsensusEngine`]. The engine reacts to network
//! messages, timer ticks and local proposals, and decides every slot either
//! by finalizing one block or by skipping it.
//!
//! # Architecture
//!
//! 1. **Disseminator** (`dissemination.rs`) - Reconstruction-unit gate
//! 2. **Votor** (`votor.rs`) - Round-1 / round-2 vote collection
//! 3. **SkipManager** (`skip.rs`) - Skip votes and skip certificates
//! 4. **SlotScheduler** (`scheduler.rs`) - Slot, round, leader and deadlines
//! 5. **ConsensusEngine** (`engine.rs`) - Event dispatch and the ledger view
//!
//! # Consensus Flow
//!
//! ```text
//! Slot N:
//!   1. Leader = schedule(N)
//!   2. Leader proposes block B
//!   3. Validators reconstruct B from >= 80% of its units
//!   4. Round 1: >= 80% stake votes B       = finalize (fast)
//!   5. Round 1 timeout, round 2: >= 60%    = finalize (fallback)
//!   6. Slot timeout, nothing received: >= 60% skip votes = skip
//!   7. Advance to slot N+1
//! ```
//!
//! # Example
//!
//! ```rust
//! use glow_consensus::{ConsensusEngine, EngineConfig, EngineOutput, Event};
//! use glow_core::{Block, Slot, StakeTable, ValidatorId};
//!
//! let table = StakeTable::uniform(5, 1).unwrap();
//! let mut engine = ConsensusEngine::new(ValidatorId(1), table, EngineConfig::default()).unwrap();
//!
//! let block = Block::from_payload(Slot(0), ValidatorId(1), b"payload");
//! let outputs = engine.handle(Event::Propose(block));
//! assert!(matches!(outputs[0], EngineOutput::Broadcast(_)));
//! ```

pub mod config;
pub mod dissemination;
pub mod engine;
pub mod message;
pub mod rejection;
pub mod scheduler;
pub mod service;
pub mod skip;
pub mod votor;

pub use config::{EngineConfig, LeaderScheduleKind};
pub use dissemination::{Disseminator, ReconstructionState, RelayPlan, UnitOutcome};
pub use engine::{ConsensusEngine, EngineOutput, EngineStats, Event, FinalizeEvent, SkipEvent};
pub use message::{ConsensusMessage, UnitMessage};
pub use rejection::{ProposalFault, Rejection, RejectionKind, SkipFault};
pub use scheduler::{
    Deadline, LeaderSchedule, RoundRobin, SlotDeadlines, SlotPhase, SlotRecord, SlotScheduler,
    StakeWeighted,
};
pub use service::{ConsensusService, ServiceError, ServiceHandle};
pub use skip::{SkipManager, SkipStats};
pub use votor::{AcceptedVote, EquivocationEvidence, VoteStats, Votor, VotorPhase};
