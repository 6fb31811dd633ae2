//! Small identifier newtypes used across the workspace.

use crate::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position in the chain. Strictly sequential; height 0 means "nothing
/// committed yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct BlockHeight(pub u64);

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl BlockHeight {
    /// The next height.
    pub fn next(self) -> BlockHeight {
        BlockHeight(self.0 + 1)
    }
}

/// Identity of a committed store version: the version number and the Merkle
/// root it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommitId {
    pub version: u64,
    pub hash: Hash,
}

