//! Candidate state cache.
//!
//! A proposal round produces a candidate execution state keyed by block hash.
//! Multiple rounds at the same height can be live simultaneously (different
//! proposers, timeouts), which is why the key is the hash and not the height.
//!
//! The cache does not understand voting: the consensus engine decides the
//! winner and reports it in through [`Candidates::mark_final`]. Once the
//! height's outcome is durable, [`Candidates::reset`] drops everything.

use crate::state::State;
use causeway_types::{Hash, ValidatorUpdate};
use std::collections::HashMap;

/// A finalized-but-not-yet-committed execution result.
#[derive(Debug)]
pub struct CandidateRecord {
    /// The branch state the block was executed against.
    pub state: State,
    /// Validator-set changes to apply when the block commits.
    pub validator_updates: Vec<ValidatorUpdate>,
}

/// Candidate cache failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CandidateError {
    #[error("no candidate recorded for block {0}")]
    NotFound(Hash),

    #[error("cannot finalize unknown candidate {0}")]
    UnknownCandidate(Hash),

    #[error("no candidate has been finalized")]
    NoFinal,

    #[error("finalized candidate {0} has vanished from the cache")]
    CorruptFinal(Hash),
}

/// In-flight candidate states for the current height.
#[derive(Debug, Default)]
pub struct Candidates {
    records: HashMap<Hash, CandidateRecord>,
    finalized: Option<Hash>,
}

impl Candidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a candidate. Overwriting an existing entry is expected round
    /// replacement, not an error; an overwrite of the currently finalized
    /// entry leaves the final mark pointing at the new record.
    pub fn put(&mut self, hash: Hash, record: CandidateRecord) {
        self.records.insert(hash, record);
    }

    /// Look up a candidate.
    pub fn get(&self, hash: &Hash) -> Result<&CandidateRecord, CandidateError> {
        self.records.get(hash).ok_or(CandidateError::NotFound(*hash))
    }

    /// Mark the round winner, as reported by the consensus engine.
    pub fn mark_final(&mut self, hash: &Hash) -> Result<(), CandidateError> {
        if !self.records.contains_key(hash) {
            return Err(CandidateError::UnknownCandidate(*hash));
        }
        self.finalized = Some(*hash);
        Ok(())
    }

    /// The winning candidate, if one has been marked.
    pub fn get_final(&self) -> Result<&CandidateRecord, CandidateError> {
        let hash = self.finalized.ok_or(CandidateError::NoFinal)?;
        self.records
            .get(&hash)
            .ok_or(CandidateError::CorruptFinal(hash))
    }

    /// Drop all candidates and the final mark. Called once a height's
    /// outcome is durable and earlier rounds are moot.
    pub fn reset(&mut self) {
        self.records.clear();
        self.finalized = None;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
