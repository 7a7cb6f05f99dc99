//! Glow Core - Fundamental types for the glow finalization protocol.
//!
//! This crate provides the data model shared by every validator engine:
//!
//! - [`types`] - Validator, slot, round and block identifiers
//! - [`stake`] - The per-epoch stake table
//! - [`quorum`] - Stake-weighted threshold evaluation (80% / 60% / 60%)
//! - [`vote`] - Round votes and skip votes
//! - [`certificate`] - Quorum and skip certificates
//! - [`ledger`] - The append-only finalized ledger
//!
//! # Example
//!
//! ```rust
//! use glow_core::{QuorumCalculator, StakeTable, Threshold, ValidatorId, VoterSet};
//!
//! let table = StakeTable::uniform(5, 1).unwrap();
//! let quorum = QuorumCalculator::new(table).unwrap();
//!
//! let voters: VoterSet = [1, 2, 3, 4].into_iter().map(ValidatorId).collect();
//! assert!(quorum.meets_quorum(&voters, Threshold::Fast));
//! ```

pub mod block;
pub mod certificate;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod params;
pub mod quorum;
pub mod stake;
pub mod types;
pub mod vote;

#[cfg(test)]
mod proptest;

pub use block::Block;
pub use certificate::{Certificate, CertificateError, QuorumCertificate, SkipCertificate};
pub use error::{Error, ErrorCode, Result};
pub use hash::{hash, hash_all, Hash};
pub use ledger::{FinalizedLedger, LedgerConflict, LedgerEntry, LedgerStats, Outcome};
pub use quorum::{QuorumCalculator, Threshold};
pub use stake::{StakeTable, Validator, VoterSet};
pub use types::{BlockId, Round, Slot, ValidatorId};
pub use vote::{SkipVote, Vote};
