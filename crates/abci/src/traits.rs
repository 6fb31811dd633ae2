//! Collaborator seams.
//!
//! The service owns protocol sequencing and state branching; block
//! construction, validation, and execution belong to these collaborators.
//! Each phase hands its branch [`State`] to the collaborator, which reads and
//! writes through it; the request context travels inside the state.

use crate::requests::{FinalizeBlockRequest, ProcessProposalRequest, SlotData};
use crate::state::{RequestContext, State};
use async_trait::async_trait;
use causeway_types::{AppGenesis, ValidatorUpdate};
use std::time::Instant;

/// Failure from the chain state-transition collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BlockchainError {
    /// The proposed payload is content-invalid. Recoverable at the protocol
    /// level: the proposal is rejected and the round continues.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Infrastructure failure; validity could not be determined.
    #[error("{0}")]
    Internal(String),
}

/// Failure from the block builder collaborator.
#[derive(Debug, Clone, thiserror::Error)]
#[error("block build failed: {0}")]
pub struct BuilderError(pub String);

/// The deterministic state-transition function of the chain.
#[async_trait]
pub trait Blockchain: Send + Sync {
    /// Apply validated genesis data to a fresh branch, producing the initial
    /// validator set.
    async fn process_genesis_data(
        &self,
        state: &mut State,
        genesis: &AppGenesis,
    ) -> Result<Vec<ValidatorUpdate>, BlockchainError>;

    /// Validate a proposed payload against the given branch.
    async fn process_proposal(
        &self,
        state: &mut State,
        req: &ProcessProposalRequest,
    ) -> Result<(), BlockchainError>;

    /// Execute the round winner against the given branch, producing
    /// validator-set changes.
    async fn finalize_block(
        &self,
        state: &mut State,
        req: &FinalizeBlockRequest,
    ) -> Result<Vec<ValidatorUpdate>, BlockchainError>;
}

/// Builds payloads by driving the execution-layer client.
///
/// May block on external engine calls; implementations must select against
/// `ctx.cancelled()` so shutdown interrupts an in-flight build.
#[async_trait]
pub trait BlockBuilder: Send + Sync {
    /// Produce the payload bytes and blob sidecar bytes for a slot.
    async fn build_block_and_sidecars(
        &self,
        ctx: &RequestContext,
        slot: SlotData,
    ) -> Result<(Vec<u8>, Vec<u8>), BuilderError>;
}

/// Latency measurement sink.
pub trait TelemetrySink: Send + Sync {
    /// Record the time elapsed since `start` under `metric`.
    fn measure_since(&self, metric: &'static str, start: Instant);
}

/// Sink that drops all measurements.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn measure_since(&self, _metric: &'static str, _start: Instant) {}
}
