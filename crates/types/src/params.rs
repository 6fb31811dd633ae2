//! Network-wide consensus parameters.
//!
//! These values are part of consensus: every validator must run with the same
//! ones, loaded from genesis. Node-local tuning lives in the node crate and
//! may differ per machine.
//!
//! Defaults are constructed with [`ConsensusParams::for_chain`], which
//! self-validates and returns an error instead of panicking; only the
//! top-level startup sequence is allowed to treat that error as fatal.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chain-level constants the consensus parameters are validated against.
///
/// These come from the chain specification, not from genesis: they describe
/// what the application binary itself supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    /// Chain identifier (e.g. `causeway-devnet-1`).
    pub chain_id: String,
    /// Height at which the deneb payload rules activate.
    pub deneb_fork_height: u64,
    /// Height at which the electra payload rules activate.
    pub electra_fork_height: u64,
    /// Largest payload the execution layer will accept, in bytes.
    pub max_payload_size: u64,
}

impl ChainSpec {
    /// A spec suitable for local development networks.
    pub fn devnet() -> Self {
        Self {
            chain_id: "causeway-devnet-1".to_string(),
            deneb_fork_height: 1,
            electra_fork_height: 100,
            max_payload_size: 100 * 1024 * 1024,
        }
    }
}

/// Evidence retention bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceParams {
    /// Maximum age of evidence, in blocks.
    pub max_age_num_blocks: u64,
    /// Maximum age of evidence, as wall time.
    pub max_age_duration: Duration,
}

/// Block size bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParams {
    /// Maximum total block size in bytes.
    pub max_bytes: u64,
}

/// Proposer-based timestamp synchrony bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynchronyParams {
    /// Assumed bound on clock drift between validators.
    pub precision: Duration,
    /// Assumed bound on end-to-end message delay.
    pub message_delay: Duration,
}

/// Feature-activation heights carried in consensus parameters.
///
/// Kept in ascending activation order; validated against the chain spec so a
/// network cannot be configured to activate a fork the binary cannot execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureParams {
    pub deneb_height: u64,
    pub electra_height: u64,
}

/// The floor on `BlockParams::max_bytes`.
///
/// Blocks carry a full execution payload plus blob sidecar commitments, so a
/// network configured below this cannot make progress.
pub const MIN_MAX_BLOCK_BYTES: u64 = 10 * 1024 * 1024;

/// Network-wide consensus parameters, sourced from genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub evidence: EvidenceParams,
    pub block: BlockParams,
    pub synchrony: SynchronyParams,
    pub feature: FeatureParams,
}

/// A consensus-parameter validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamsError {
    #[error("block.max_bytes {got} is below the minimum {floor}")]
    MaxBytesBelowFloor { floor: u64, got: u64 },

    #[error("block.max_bytes {got} exceeds the execution layer's payload cap {cap}")]
    MaxBytesAboveCap { cap: u64, got: u64 },

    #[error("evidence.max_age_num_blocks must be non-zero")]
    ZeroEvidenceAge,

    #[error("synchrony bounds must be non-zero (precision {precision:?}, message_delay {message_delay:?})")]
    ZeroSynchronyBound {
        precision: Duration,
        message_delay: Duration,
    },

    #[error("activation heights must be ascending: deneb {deneb} >= electra {electra}")]
    ForkOrder { deneb: u64, electra: u64 },

    #[error("activation heights disagree with the chain spec: params {got}, spec {expected}")]
    ForkMismatch { expected: u64, got: u64 },
}

impl ConsensusParams {
    /// Build the default parameters for a chain and self-validate them.
    pub fn for_chain(spec: &ChainSpec) -> Result<Self, ParamsError> {
        let params = Self {
            evidence: EvidenceParams {
                max_age_num_blocks: 100_000,
                max_age_duration: Duration::from_secs(48 * 60 * 60),
            },
            block: BlockParams {
                max_bytes: MIN_MAX_BLOCK_BYTES,
            },
            synchrony: SynchronyParams {
                precision: Duration::from_millis(505),
                message_delay: Duration::from_secs(15),
            },
            feature: FeatureParams {
                deneb_height: spec.deneb_fork_height,
                electra_height: spec.electra_fork_height,
            },
        };
        params.validate(spec)?;
        Ok(params)
    }

    /// Validate parameters (defaults or genesis-loaded) against the chain spec.
    pub fn validate(&self, spec: &ChainSpec) -> Result<(), ParamsError> {
        if self.block.max_bytes < MIN_MAX_BLOCK_BYTES {
            return Err(ParamsError::MaxBytesBelowFloor {
                floor: MIN_MAX_BLOCK_BYTES,
                got: self.block.max_bytes,
            });
        }
        if self.block.max_bytes > spec.max_payload_size {
            return Err(ParamsError::MaxBytesAboveCap {
                cap: spec.max_payload_size,
                got: self.block.max_bytes,
            });
        }
        if self.evidence.max_age_num_blocks == 0 {
            return Err(ParamsError::ZeroEvidenceAge);
        }
        if self.synchrony.precision.is_zero() || self.synchrony.message_delay.is_zero() {
            return Err(ParamsError::ZeroSynchronyBound {
                precision: self.synchrony.precision,
                message_delay: self.synchrony.message_delay,
            });
        }
        if self.feature.deneb_height >= self.feature.electra_height {
            return Err(ParamsError::ForkOrder {
                deneb: self.feature.deneb_height,
                electra: self.feature.electra_height,
            });
        }
        if self.feature.deneb_height != spec.deneb_fork_height {
            return Err(ParamsError::ForkMismatch {
                expected: spec.deneb_fork_height,
                got: self.feature.deneb_height,
            });
        }
        if self.feature.electra_height != spec.electra_fork_height {
            return Err(ParamsError::ForkMismatch {
                expected: spec.electra_fork_height,
                got: self.feature.electra_height,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_self_validate() {
        let spec = ChainSpec::devnet();
        let params = ConsensusParams::for_chain(&spec).unwrap();
        assert!(params.validate(&spec).is_ok());
        assert_eq!(params.block.max_bytes, MIN_MAX_BLOCK_BYTES);
    }

    #[test]
    fn test_max_bytes_floor_names_both_values() {
        let spec = ChainSpec::devnet();
        let mut params = ConsensusParams::for_chain(&spec).unwrap();
        params.block.max_bytes = 1024;

        match params.validate(&spec) {
            Err(ParamsError::MaxBytesBelowFloor { floor, got }) => {
                assert_eq!(floor, MIN_MAX_BLOCK_BYTES);
                assert_eq!(got, 1024);
            }
            other => panic!("expected MaxBytesBelowFloor, got {other:?}"),
        }
    }

    #[test]
    fn test_fork_order_enforced() {
        let spec = ChainSpec::devnet();
        let mut params = ConsensusParams::for_chain(&spec).unwrap();
        params.feature.deneb_height = 200;
        params.feature.electra_height = 100;
        assert!(matches!(
            params.validate(&spec),
            Err(ParamsError::ForkOrder { .. })
        ));
    }

    #[test]
    fn test_fork_mismatch_against_spec() {
        let spec = ChainSpec::devnet();
        let mut params = ConsensusParams::for_chain(&spec).unwrap();
        params.feature.deneb_height = 2;
        let err = params.validate(&spec).unwrap_err();
        assert!(matches!(err, ParamsError::ForkMismatch { expected: 1, got: 2 }));
    }

    #[test]
    fn test_defaults_fit_under_payload_cap() {
        let mut spec = ChainSpec::devnet();
        spec.max_payload_size = 1024 * 1024;
        assert!(matches!(
            ConsensusParams::for_chain(&spec),
            Err(ParamsError::MaxBytesAboveCap { .. })
        ));
    }
}
