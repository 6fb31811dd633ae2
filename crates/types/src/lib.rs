//! Foundation types for the causeway consensus bridge.
//!
//! This crate provides the types shared by the ABCI service and the node
//! wiring:
//!
//! - **Primitives**: [`Hash`], identifier newtypes
//! - **Validator set**: [`ValidatorUpdate`] and its engine wire conversion
//! - **Consensus parameters**: [`ConsensusParams`] and the [`ChainSpec`] they
//!   are validated against
//! - **Genesis**: the genesis document model and its content validation
//! - **Topology**: the bounded-fanout validator peer tree for test networks
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer. Everything
//! here is plain data plus pure functions; no I/O, no async.

mod hash;
mod identifiers;

mod genesis;
mod params;
mod topology;
mod validator;

pub use hash::{Hash, HexError};
pub use identifiers::{BlockHeight, CommitId};

pub use genesis::{
    validate_deposits, validate_execution_header, validate_fork_version, AppGenesis, Deposit,
    ExecutionHeader, Genesis, GenesisError, EMPTY_TRIE_ROOT, MAX_EXTRA_DATA_BYTES,
};
pub use params::{
    BlockParams, ChainSpec, ConsensusParams, EvidenceParams, FeatureParams, ParamsError,
    SynchronyParams, MIN_MAX_BLOCK_BYTES,
};
pub use topology::{
    PeerSlot, PeerTopology, TopologyError, DEFAULT_MAX_INBOUND, DEFAULT_MAX_OUTBOUND,
};
pub use validator::{
    to_wire_updates, BlsPublicKey, PublicKeyError, ValidatorUpdate, WireValidatorUpdate,
    WIRE_KEY_TYPE_BLS,
};

#[cfg(any(test, feature = "test-utils"))]
pub use genesis::test_utils;
