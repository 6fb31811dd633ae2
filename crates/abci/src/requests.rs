//! Request and response types for the engine-facing call surface.
//!
//! These mirror the consensus engine's wire shapes closely enough that the
//! node's transport layer can map them one-to-one. Transactions are opaque,
//! pre-validated payload blobs, not a mempool of user transactions.

use causeway_types::{ConsensusParams, Hash, WireValidatorUpdate};
use std::time::{Duration, SystemTime};

/// `InitChain`: one-time chain initialization from genesis.
#[derive(Debug, Clone)]
pub struct InitChainRequest {
    pub chain_id: String,
    /// Genesis time; anchors the block-delay schedule.
    pub time: SystemTime,
    /// The engine's genesis validator list. This chain derives its validator
    /// set from genesis deposits, so any entries here are a misconfiguration.
    pub validators: Vec<WireValidatorUpdate>,
    /// Opaque application genesis blob.
    pub app_state: serde_json::Value,
    /// First block height; zero is normalized to one.
    pub initial_height: u64,
}

#[derive(Debug, Clone)]
pub struct InitChainResponse {
    pub validators: Vec<WireValidatorUpdate>,
    pub app_hash: Hash,
}

/// `PrepareProposal`: this node is the round's proposer.
#[derive(Debug, Clone)]
pub struct PrepareProposalRequest {
    pub height: u64,
    pub time: SystemTime,
    pub txs: Vec<Vec<u8>>,
    pub proposer_address: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct PrepareProposalResponse {
    pub txs: Vec<Vec<u8>>,
}

/// `ProcessProposal`: validate another proposer's block.
#[derive(Debug, Clone)]
pub struct ProcessProposalRequest {
    pub height: u64,
    pub hash: Hash,
    pub time: SystemTime,
    pub txs: Vec<Vec<u8>>,
    pub proposer_address: Vec<u8>,
}

/// Outcome of proposal validation.
///
/// `Reject` is a clean content-level verdict; "could not determine validity"
/// is expressed by returning an error instead, which the engine handles as a
/// node fault rather than a vote against the proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalStatus {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessProposalResponse {
    pub status: ProposalStatus,
}

/// `FinalizeBlock`: execute the round winner.
#[derive(Debug, Clone)]
pub struct FinalizeBlockRequest {
    pub height: u64,
    pub hash: Hash,
    pub time: SystemTime,
    pub txs: Vec<Vec<u8>>,
    pub proposer_address: Vec<u8>,
}

/// Per-transaction execution result.
///
/// Transactions are opaque blobs validated as part of the whole payload, so
/// each one reports the fixed accepted status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxResult {
    pub code: u32,
}

impl TxResult {
    pub const ACCEPTED: u32 = 0;

    pub fn accepted() -> Self {
        TxResult {
            code: Self::ACCEPTED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FinalizeBlockResponse {
    pub tx_results: Vec<TxResult>,
    pub validator_updates: Vec<WireValidatorUpdate>,
    pub consensus_param_updates: Option<ConsensusParams>,
    /// Working root after this height's writes; the engine cross-checks it
    /// against every other validator before the height becomes durable.
    pub app_hash: Hash,
    /// Pacing hint: how long the engine should wait before the next proposal.
    pub next_block_delay: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommitResponse {
    /// Height below which the engine may discard history (0 = keep all).
    pub retain_height: u64,
}

/// Raw store query.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub path: String,
    pub data: Vec<u8>,
    pub height: u64,
    pub prove: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QueryResponse {
    pub value: Option<Vec<u8>>,
    pub height: u64,
}

/// Payload description handed to the block builder.
#[derive(Debug, Clone)]
pub struct SlotData {
    pub height: u64,
    pub time: SystemTime,
    pub parent_block_root: Hash,
}

// ═══════════════════════════════════════════════════════════════════════════
// No-op surface
// ═══════════════════════════════════════════════════════════════════════════
// Snapshot transfer and vote extensions are unsupported; the endpoints exist
// so the engine's connection handshake succeeds.

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckTxResponse {
    pub code: u32,
}

/// Metadata for a state-sync snapshot. Never produced; present so the
/// response type matches the engine's wire shape.
#[derive(Debug, Clone, Default)]
pub struct SnapshotMeta {
    pub height: u64,
    pub format: u32,
    pub chunks: u32,
    pub hash: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ListSnapshotsResponse {
    pub snapshots: Vec<SnapshotMeta>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadSnapshotChunkResponse {
    pub chunk: Vec<u8>,
}

/// The engine is told to reject all offered snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfferSnapshotResponse {
    pub accepted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApplySnapshotChunkResponse {
    pub accepted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExtendVoteResponse {
    pub vote_extension: Vec<u8>,
}

/// Extensions are never produced, so any non-empty one is rejected.
#[derive(Debug, Clone, Copy)]
pub struct VerifyVoteExtensionResponse {
    pub accepted: bool,
}
