//! The consensus-application bridge service.
//!
//! The consensus engine drives this service through a fixed call sequence:
//!
//! ```text
//! InitChain → (PrepareProposal → ProcessProposal)* → FinalizeBlock → Commit
//!                     └── once per round ──┘            └─ once per height ─┘
//! ```
//!
//! Calls arrive synchronously and serially on a single logical connection;
//! that ordering is a documented contract with the engine, not something
//! enforced here. Within a height, the prepare/process pair may run many
//! times (one per round) and must be idempotent: every round discards the
//! previous round's branch state before creating its own.
//!
//! Violations of the call sequence itself (a commit with nothing finalized)
//! indicate an engine fault and panic rather than continuing with undefined
//! state: continuing would risk silent consensus divergence, which is strictly
//! worse than a crash.

use crate::candidates::{CandidateError, CandidateRecord, Candidates};
use crate::delay::{BlockDelay, ScheduleDecodeError, SCHEDULE_BYTES};
use crate::requests::*;
use crate::retention::retention_height;
use crate::state::{RequestContext, State};
use crate::store::{RootStore, StoreError};
use crate::traits::{BlockBuilder, Blockchain, BlockchainError, TelemetrySink};
use causeway_types::{
    to_wire_updates, AppGenesis, BlockHeight, ConsensusParams, GenesisError, Hash,
};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

const METRIC_INIT_CHAIN: &str = "abci_init_chain";
const METRIC_PREPARE: &str = "abci_prepare_proposal";
const METRIC_PROCESS: &str = "abci_process_proposal";
const METRIC_FINALIZE: &str = "abci_finalize_block";
const METRIC_COMMIT: &str = "abci_commit";

/// Service-level failure returned to the engine.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("chain id mismatch: expected {expected}, got {got}")]
    ChainIdMismatch { expected: String, got: String },

    #[error(
        "engine supplied {0} genesis validators; this chain derives its \
         validator set from genesis deposits"
    )]
    UnexpectedGenesisValidators(usize),

    #[error("invalid genesis: {0}")]
    Genesis(#[from] GenesisError),

    #[error("proposal height must be at least 1")]
    ZeroHeight,

    #[error("invalid block height: expected {expected}, got {got}")]
    InvalidHeight { expected: u64, got: u64 },

    #[error("store proofs are unavailable at height {0}")]
    ProofUnavailable(u64),

    #[error(transparent)]
    Candidate(#[from] CandidateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("blockchain collaborator failed: {0}")]
    Blockchain(#[from] BlockchainError),
}

/// Static service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Chain id the engine must present in `InitChain`.
    pub chain_id: String,
    /// Network-wide consensus parameters (genesis-sourced).
    pub params: ConsensusParams,
    /// Node-local pruning preference; 0 disables pruning.
    pub min_retain_blocks: u64,
    /// Target block spacing for the delay schedule.
    pub target_block_time: Duration,
    /// Gap beyond which the delay schedule re-anchors.
    pub max_stall_gap: Duration,
}

impl ServiceConfig {
    pub fn new(chain_id: impl Into<String>, params: ConsensusParams) -> Self {
        Self {
            chain_id: chain_id.into(),
            params,
            min_retain_blocks: 0,
            target_block_time: crate::delay::DEFAULT_TARGET_BLOCK_TIME,
            max_stall_gap: crate::delay::DEFAULT_MAX_STALL_GAP,
        }
    }

    pub fn with_min_retain_blocks(mut self, blocks: u64) -> Self {
        self.min_retain_blocks = blocks;
        self
    }

    pub fn with_target_block_time(mut self, target: Duration) -> Self {
        self.target_block_time = target;
        self
    }

    pub fn with_max_stall_gap(mut self, gap: Duration) -> Self {
        self.max_stall_gap = gap;
        self
    }
}

/// The ABCI-style application service.
///
/// Owns the candidate branch states for the in-flight height and the
/// finalization bookkeeping the engine depends on. Block construction,
/// validation, and execution are delegated to the collaborators.
pub struct Service {
    config: ServiceConfig,
    initial_height: BlockHeight,

    blockchain: Arc<dyn Blockchain>,
    builder: Arc<dyn BlockBuilder>,
    root: Arc<dyn RootStore>,
    telemetry: Arc<dyn TelemetrySink>,

    delay: BlockDelay,
    candidates: Candidates,

    /// Proposer-side branch for the round being built.
    prepare_state: Option<State>,
    /// Validation branch for the round being checked.
    process_state: Option<State>,
    /// What becomes final if the current round wins. Set by `init_chain`
    /// (genesis) and by `process_proposal` for later heights; consumed by
    /// `finalize_block`; empty only between a commit and the next finalize.
    finalize_state: Option<State>,
}

impl Service {
    pub fn new(
        config: ServiceConfig,
        blockchain: Arc<dyn Blockchain>,
        builder: Arc<dyn BlockBuilder>,
        root: Arc<dyn RootStore>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let delay = BlockDelay::with_timing(
            SystemTime::now(),
            BlockHeight(1),
            config.target_block_time,
            config.max_stall_gap,
        );
        Self {
            config,
            initial_height: BlockHeight(1),
            blockchain,
            builder,
            root,
            telemetry,
            delay,
            candidates: Candidates::new(),
            prepare_state: None,
            process_state: None,
            finalize_state: None,
        }
    }

    /// One-time chain initialization from genesis.
    pub async fn init_chain(
        &mut self,
        ctx: &RequestContext,
        req: &InitChainRequest,
    ) -> Result<InitChainResponse, ServiceError> {
        let start = Instant::now();

        if req.chain_id != self.config.chain_id {
            return Err(ServiceError::ChainIdMismatch {
                expected: self.config.chain_id.clone(),
                got: req.chain_id.clone(),
            });
        }
        if !req.validators.is_empty() {
            return Err(ServiceError::UnexpectedGenesisValidators(
                req.validators.len(),
            ));
        }

        let app_genesis = AppGenesis::from_json(&req.app_state)?;
        app_genesis.validate()?;

        let initial_height = if req.initial_height == 0 {
            1
        } else {
            req.initial_height
        };
        self.initial_height = BlockHeight(initial_height);
        if initial_height > 1 {
            self.root.set_initial_version(initial_height)?;
        }
        self.delay = BlockDelay::with_timing(
            req.time,
            self.initial_height,
            self.config.target_block_time,
            self.config.max_stall_gap,
        );

        let mut state = State::new(self.root.branch(), ctx.clone());
        let updates = self
            .blockchain
            .process_genesis_data(&mut state, &app_genesis)
            .await?;

        self.root.write_branch(state.branch());
        let app_hash = self.root.working_hash();

        // Genesis-time mutations must be visible to the very first proposal,
        // so the genesis branch becomes the initial finalize state.
        self.finalize_state = Some(state);

        info!(
            chain_id = %req.chain_id,
            initial_height,
            validators = updates.len(),
            app_hash = %app_hash,
            "chain initialized from genesis"
        );
        self.telemetry.measure_since(METRIC_INIT_CHAIN, start);

        Ok(InitChainResponse {
            validators: to_wire_updates(&updates),
            app_hash,
        })
    }

    /// Build this round's proposal.
    pub async fn prepare_proposal(
        &mut self,
        ctx: &RequestContext,
        req: &PrepareProposalRequest,
    ) -> Result<PrepareProposalResponse, ServiceError> {
        let start = Instant::now();

        // A cancelled context means shutdown is in progress. This call must
        // never hard-fail then; echoing the request payload is a harmless
        // pass-through the engine accepts.
        if ctx.is_cancelled() {
            debug!(height = req.height, "shutdown in progress, echoing proposal");
            return Ok(PrepareProposalResponse {
                txs: req.txs.clone(),
            });
        }
        if req.height == 0 {
            return Err(ServiceError::ZeroHeight);
        }

        // Round-idempotent: retries and timeouts never see leftover mutation.
        self.prepare_state = None;

        // At the initial height the round context comes from the genesis
        // finalize state, so genesis-time mutations are visible to the very
        // first proposal.
        let round_ctx = match &self.finalize_state {
            Some(genesis) if BlockHeight(req.height) == self.initial_height => genesis.context(),
            _ => ctx.clone(),
        };

        let state = State::new(self.root.branch(), round_ctx);
        let build_ctx = state.context();
        self.prepare_state = Some(state);

        let slot = SlotData {
            height: req.height,
            time: req.time,
            parent_block_root: self.root.last_commit_id().hash,
        };

        let response = match self.builder.build_block_and_sidecars(&build_ctx, slot).await {
            Ok((block, sidecars)) => PrepareProposalResponse {
                txs: vec![block, sidecars],
            },
            Err(err) => {
                // An empty proposal still lets the round complete; an error
                // here would stall the engine instead.
                warn!(height = req.height, error = %err, "payload build failed, proposing empty block");
                PrepareProposalResponse::default()
            }
        };

        self.telemetry.measure_since(METRIC_PREPARE, start);
        Ok(response)
    }

    /// Validate another proposer's block for this round.
    pub async fn process_proposal(
        &mut self,
        ctx: &RequestContext,
        req: &ProcessProposalRequest,
    ) -> Result<ProcessProposalResponse, ServiceError> {
        let start = Instant::now();

        if req.height == 0 {
            return Err(ServiceError::ZeroHeight);
        }

        self.process_state = Some(State::new(self.root.branch(), ctx.clone()));

        // Past the initial height, rebuild the candidate-final branch for
        // this round. At the initial height the finalize state is the genesis
        // branch and must survive untouched.
        if BlockHeight(req.height) != self.initial_height {
            self.finalize_state = Some(State::new(self.root.branch(), ctx.clone()));
        }

        let state = self
            .process_state
            .as_mut()
            .expect("process state was just created");

        let response = match self.blockchain.process_proposal(state, req).await {
            Ok(()) => ProcessProposalResponse {
                status: ProposalStatus::Accept,
            },
            Err(BlockchainError::InvalidPayload(reason)) => {
                // A content-invalid proposal is a clean verdict, not a fault:
                // returning an error instead would tell the engine we could
                // not determine validity at all.
                info!(height = req.height, block = %req.hash, %reason, "rejecting proposal");
                ProcessProposalResponse {
                    status: ProposalStatus::Reject,
                }
            }
            Err(err @ BlockchainError::Internal(_)) => return Err(err.into()),
        };

        self.telemetry.measure_since(METRIC_PROCESS, start);
        Ok(response)
    }

    /// Execute the round winner and stage it for commit.
    pub async fn finalize_block(
        &mut self,
        ctx: &RequestContext,
        req: &FinalizeBlockRequest,
    ) -> Result<FinalizeBlockResponse, ServiceError> {
        let start = Instant::now();

        let expected = self.expected_height();
        if req.height != expected.0 {
            return Err(ServiceError::InvalidHeight {
                expected: expected.0,
                got: req.height,
            });
        }

        let mut state = match self.finalize_state.take() {
            Some(state) => {
                // Normal path: reuse the candidate branch from this round,
                // re-pointed at the new request's context.
                state.set_context(ctx.clone());
                state
            }
            None => {
                // The engine replays committed blocks after a restart without
                // calling ProcessProposal first, so no candidate branch
                // exists; build one directly from the committed root.
                info!(height = req.height, "no round state, rebuilding from committed root (replay)");
                State::new(self.root.branch(), ctx.clone())
            }
        };

        let updates = self.blockchain.finalize_block(&mut state, req).await?;

        self.candidates.put(
            req.hash,
            CandidateRecord {
                state,
                validator_updates: updates.clone(),
            },
        );
        self.candidates.mark_final(&req.hash)?;

        let app_hash = self.working_hash()?;
        let next_block_delay = self.delay.next(req.time, BlockHeight(req.height));

        debug!(
            height = req.height,
            block = %req.hash,
            app_hash = %app_hash,
            validator_updates = updates.len(),
            next_block_delay_ms = next_block_delay.as_millis() as u64,
            "block finalized"
        );
        self.telemetry.measure_since(METRIC_FINALIZE, start);

        Ok(FinalizeBlockResponse {
            tx_results: req.txs.iter().map(|_| TxResult::accepted()).collect(),
            validator_updates: to_wire_updates(&updates),
            consensus_param_updates: None,
            app_hash,
            next_block_delay,
        })
    }

    /// Write the winning candidate's branch into the root store and return
    /// the resulting Merkle root.
    ///
    /// The writes become visible but not durable: this is how the engine
    /// learns the app hash for a height before that height is committed.
    pub fn working_hash(&self) -> Result<Hash, ServiceError> {
        let record = self.candidates.get_final()?;
        self.root.write_branch(record.state.branch());
        Ok(self.root.working_hash())
    }

    /// Durably persist the finalized height.
    ///
    /// # Panics
    ///
    /// Panics if nothing has been finalized. Under correct engine sequencing
    /// a commit always follows a finalize for the same height, so this is
    /// unreachable; continuing instead would commit an undefined state.
    pub fn commit(&mut self) -> Result<CommitResponse, ServiceError> {
        let start = Instant::now();

        let record = match self.candidates.get_final() {
            Ok(record) => record,
            Err(err) => panic!("commit without a finalized block: {err}"),
        };
        self.root.write_branch(record.state.branch());

        let commit_id = self.root.commit()?;
        let retain_height = retention_height(
            commit_id.version,
            self.config.params.evidence.max_age_num_blocks,
            self.config.min_retain_blocks,
        );

        // Earlier rounds are moot once the outcome is durable. Clearing the
        // finalize state forces the next height back through FinalizeBlock.
        self.candidates.reset();
        self.finalize_state = None;
        self.prepare_state = None;
        self.process_state = None;

        info!(
            height = commit_id.version,
            app_hash = %commit_id.hash,
            retain_height,
            "block committed"
        );
        self.telemetry.measure_since(METRIC_COMMIT, start);

        Ok(CommitResponse { retain_height })
    }

    /// Serve a raw store query.
    ///
    /// Proofs cannot be produced at height ≤ 1: the backing store has no
    /// meaningful predecessor version there.
    pub fn query(&self, req: &QueryRequest) -> Result<QueryResponse, ServiceError> {
        if req.prove && req.height <= 1 {
            return Err(ServiceError::ProofUnavailable(req.height));
        }
        let value = self.root.query(&req.data)?;
        Ok(QueryResponse {
            value,
            height: self.root.latest_version(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // No-op surface
    // ═══════════════════════════════════════════════════════════════════════

    pub fn check_tx(&self) -> CheckTxResponse {
        CheckTxResponse::default()
    }

    pub fn list_snapshots(&self) -> ListSnapshotsResponse {
        ListSnapshotsResponse::default()
    }

    pub fn load_snapshot_chunk(&self) -> LoadSnapshotChunkResponse {
        LoadSnapshotChunkResponse::default()
    }

    pub fn offer_snapshot(&self) -> OfferSnapshotResponse {
        OfferSnapshotResponse { accepted: false }
    }

    pub fn apply_snapshot_chunk(&self) -> ApplySnapshotChunkResponse {
        ApplySnapshotChunkResponse { accepted: false }
    }

    pub fn extend_vote(&self) -> ExtendVoteResponse {
        ExtendVoteResponse::default()
    }

    pub fn verify_vote_extension(&self, extension: &[u8]) -> VerifyVoteExtensionResponse {
        VerifyVoteExtensionResponse {
            accepted: extension.is_empty(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Schedule persistence
    // ═══════════════════════════════════════════════════════════════════════

    /// Current delay schedule, for persistence alongside chain state.
    pub fn delay_schedule_bytes(&self) -> [u8; SCHEDULE_BYTES] {
        self.delay.to_bytes()
    }

    /// Restore a persisted delay schedule on startup.
    pub fn restore_delay_schedule(&mut self, bytes: &[u8]) -> Result<(), ScheduleDecodeError> {
        self.delay = BlockDelay::from_bytes(
            bytes,
            self.config.target_block_time,
            self.config.max_stall_gap,
        )?;
        Ok(())
    }

    /// The height the next `FinalizeBlock` must carry.
    fn expected_height(&self) -> BlockHeight {
        let last = self.root.latest_version();
        if last == 0 && self.initial_height.0 > 1 {
            self.initial_height
        } else {
            BlockHeight(last + 1)
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("chain_id", &self.config.chain_id)
            .field("initial_height", &self.initial_height)
            .field("latest_version", &self.root.latest_version())
            .field("candidates", &self.candidates.len())
            .field("has_prepare_state", &self.prepare_state.is_some())
            .field("has_process_state", &self.process_state.is_some())
            .field("has_finalize_state", &self.finalize_state.is_some())
            .finish()
    }
}
