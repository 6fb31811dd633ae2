//! Consensus-application bridge.
//!
//! This crate is the application half of a BFT consensus integration: the
//! external engine owns leader election, voting, and gossip; this crate owns
//! the deterministic state machine the engine drives through a fixed
//! five-call protocol (init-chain, prepare, process, finalize, commit).
//!
//! # Architecture
//!
//! - [`Service`]: orchestrates the protocol and the per-round branch states
//! - [`Candidates`]: in-flight candidate states, keyed by block hash
//! - [`BlockDelay`]: deterministic block pacing, stall-tolerant
//! - [`retention_height`]: safe pruning boundary, recomputed at every commit
//! - [`RootStore`] / [`BranchStore`]: the seam to the versioned multi-store
//! - [`Blockchain`] / [`BlockBuilder`]: the execution collaborators
//!
//! The engine invokes the service serially; internal locking exists only
//! where query handlers may race the active phase (the per-state request
//! context).

mod candidates;
mod delay;
mod requests;
mod retention;
mod service;
mod state;
mod store;
mod traits;

pub use candidates::{CandidateError, CandidateRecord, Candidates};
pub use delay::{
    BlockDelay, ScheduleDecodeError, DEFAULT_MAX_STALL_GAP, DEFAULT_TARGET_BLOCK_TIME,
    MIN_BLOCK_DELAY, SCHEDULE_BYTES,
};
pub use requests::*;
pub use retention::retention_height;
pub use service::{Service, ServiceConfig, ServiceError};
pub use state::{RequestContext, State};
pub use store::{BranchStore, MemoryStore, RootStore, StoreError};
pub use traits::{
    BlockBuilder, Blockchain, BlockchainError, BuilderError, NoopTelemetry, TelemetrySink,
};
