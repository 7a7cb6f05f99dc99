//! Stake table for one epoch.
//!
//! The table is supplied once per epoch by the stake-ledger collaborator and
//! is immutable afterwards. Order matters only for round-robin leader
//! rotation; quorum membership is a set.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::hash::{hash, Hash};
use crate::types::ValidatorId;

/// A set of validator ids used as vote or quorum membership.
pub type VoterSet = BTreeSet<ValidatorId>;

/// A validator and its stake weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Validator {
    /// Validator identifier.
    pub id: ValidatorId,
    /// Stake weight.
    pub stake: u64,
}

impl Validator {
    /// Create a validator entry.
    pub fn new(id: ValidatorId, stake: u64) -> Self {
        Self { id, stake }
    }
}

/// Ordered validators with their stake.
#[derive(Debug, Clone, Serialize)]
pub struct StakeTable {
    /// Ordered list of validators.
    validators: Vec<Validator>,
    /// Stake by id (rebuilt on deserialize).
    #[serde(skip)]
    lookup: HashMap<ValidatorId, u64>,
    #[serde(skip)]
    total_stake: u64,
}

// Custom Deserialize to rebuild the lookup and re-check uniqueness
impl<'de> Deserialize<'de> for StakeTable {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct StakeTableData {
            validators: Vec<Validator>,
        }

        let data = StakeTableData::deserialize(deserializer)?;
        StakeTable::new(data.validators).map_err(serde::de::Error::custom)
    }
}

impl StakeTable {
    /// Create a stake table. Validator ids must be unique.
    pub fn new(validators: Vec<Validator>) -> Result<Self> {
        let mut lookup = HashMap::with_capacity(validators.len());
        let mut total_stake: u64 = 0;
        for v in &validators {
            if lookup.insert(v.id, v.stake).is_some() {
                return Err(Error::duplicate_validator(v.id.to_string()));
            }
            total_stake = total_stake
                .checked_add(v.stake)
                .ok_or_else(|| Error::invalid_config("total stake overflows u64"))?;
        }
        Ok(Self {
            validators,
            lookup,
            total_stake,
        })
    }

    /// Validators `1..=count`, each with the same stake.
    pub fn uniform(count: u32, stake: u64) -> Result<Self> {
        Self::new(
            (1..=count)
                .map(|i| Validator::new(ValidatorId(i), stake))
                .collect(),
        )
    }

    /// Get the number of validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Check if an id belongs to the table.
    pub fn contains(&self, id: &ValidatorId) -> bool {
        self.lookup.contains_key(id)
    }

    /// Stake of a validator, `None` if unknown.
    pub fn stake(&self, id: &ValidatorId) -> Option<u64> {
        self.lookup.get(id).copied()
    }

    /// Sum of all stake.
    pub fn total_stake(&self) -> u64 {
        self.total_stake
    }

    /// Get validator at index.
    pub fn get(&self, index: usize) -> Option<&Validator> {
        self.validators.get(index)
    }

    /// All validators in table order.
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Iterator over validators in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Validator> {
        self.validators.iter()
    }

    /// All validator ids in table order.
    pub fn ids(&self) -> impl Iterator<Item = ValidatorId> + '_ {
        self.validators.iter().map(|v| v.id)
    }

    /// Commitment hash over the ordered (id, stake) pairs.
    pub fn commitment(&self) -> Hash {
        let mut data = Vec::with_capacity(self.validators.len() * 12);
        for v in &self.validators {
            data.extend_from_slice(&v.id.0.to_le_bytes());
            data.extend_from_slice(&v.stake.to_le_bytes());
        }
        hash(&data)
    }
}

impl PartialEq for StakeTable {
    fn eq(&self, other: &Self) -> bool {
        self.validators == other.validators
    }
}

impl Eq for StakeTable {}
