//! Genesis file model and validation.
//!
//! The validator set of this chain is derived from genesis deposits, not from
//! the consensus engine's genesis validator list, so the application carries
//! its own genesis document: chain id, an application state blob, consensus
//! parameters, and the initial height.
//!
//! Validation here is pure; it runs during `init_chain` before any state is
//! touched.

use crate::{ConsensusParams, Hash};
use crate::validator::BlsPublicKey;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Canonical root of an empty Merkle-Patricia trie, the receipts root an
/// empty genesis execution block must carry.
pub const EMPTY_TRIE_ROOT: Hash = Hash([
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8,
    0x6e, 0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63,
    0xb4, 0x21,
]);

/// Maximum length of an execution header's extra-data field.
pub const MAX_EXTRA_DATA_BYTES: usize = 32;

/// The genesis document, as stored on disk (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genesis {
    pub chain_id: String,
    /// Opaque application state; parsed into [`AppGenesis`] by `init_chain`.
    pub app_state: serde_json::Value,
    pub consensus_params: ConsensusParams,
    /// First block height. Zero is normalized to one.
    #[serde(default)]
    pub initial_height: u64,
}

/// The application half of genesis: the deposits that seed the validator set
/// and the execution-layer block the chain starts from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppGenesis {
    /// Fork version as `0x` + 8 hex characters.
    pub fork_version: String,
    pub deposits: Vec<Deposit>,
    pub execution_payload_header: ExecutionHeader,
}

/// A genesis deposit crediting a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub pubkey: BlsPublicKey,
    pub credentials: Hash,
    /// Deposit amount in gwei.
    pub amount: u64,
}

/// The execution-layer header embedded in genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHeader {
    pub parent_hash: Hash,
    pub receipts_root: Hash,
    pub prev_randao: Hash,
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub base_fee_per_gas: u64,
    pub blob_gas_used: u64,
    pub excess_blob_gas: u64,
    pub block_hash: Hash,
    #[serde(with = "hex_bytes")]
    pub extra_data: Vec<u8>,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}

/// A genesis content-validity failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenesisError {
    #[error("malformed app state: {0}")]
    MalformedAppState(String),

    #[error("fork version {0:?} must be 0x followed by exactly 8 hex characters")]
    InvalidForkVersion(String),

    #[error("genesis must contain at least one deposit")]
    NoDeposits,

    #[error("duplicate deposit public key {0}")]
    DuplicateDeposit(BlsPublicKey),

    #[error("execution header field {field} must be zero, got {got}")]
    NonZeroField { field: &'static str, got: u64 },

    #[error("execution header {0} must be the zero hash")]
    NonZeroHash(&'static str),

    #[error("execution header receipts root must be the empty-trie root")]
    BadReceiptsRoot,

    #[error("execution header field {0} must be non-zero")]
    ZeroField(&'static str),

    #[error("execution header block hash must be non-zero")]
    ZeroBlockHash,

    #[error("extra data is {got} bytes, maximum is {max}")]
    ExtraDataTooLong { max: usize, got: usize },
}

impl AppGenesis {
    /// Parse the opaque app-state blob from a genesis document.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, GenesisError> {
        serde_json::from_value(value.clone())
            .map_err(|e| GenesisError::MalformedAppState(e.to_string()))
    }

    /// Validate the whole application genesis.
    pub fn validate(&self) -> Result<(), GenesisError> {
        validate_fork_version(&self.fork_version)?;
        validate_deposits(&self.deposits)?;
        validate_execution_header(&self.execution_payload_header)
    }
}

/// Fork versions are `0x` followed by exactly 8 hex characters.
pub fn validate_fork_version(version: &str) -> Result<(), GenesisError> {
    let invalid = || GenesisError::InvalidForkVersion(version.to_string());
    let hex_part = version.strip_prefix("0x").ok_or_else(invalid)?;
    if hex_part.len() != 8 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    Ok(())
}

/// At least one deposit, with pairwise-distinct public keys.
pub fn validate_deposits(deposits: &[Deposit]) -> Result<(), GenesisError> {
    if deposits.is_empty() {
        return Err(GenesisError::NoDeposits);
    }
    let mut seen = HashSet::with_capacity(deposits.len());
    for deposit in deposits {
        if !seen.insert(deposit.pubkey) {
            return Err(GenesisError::DuplicateDeposit(deposit.pubkey));
        }
    }
    Ok(())
}

/// The genesis execution header must describe a block nothing has executed
/// in: zeroed usage counters and ancestry, a live gas market, and a real
/// block hash for the execution client to anchor on.
pub fn validate_execution_header(header: &ExecutionHeader) -> Result<(), GenesisError> {
    let zero = |field, got| {
        if got != 0 {
            Err(GenesisError::NonZeroField { field, got })
        } else {
            Ok(())
        }
    };
    zero("block_number", header.block_number)?;
    zero("gas_used", header.gas_used)?;
    zero("blob_gas_used", header.blob_gas_used)?;
    zero("excess_blob_gas", header.excess_blob_gas)?;

    if !header.parent_hash.is_zero() {
        return Err(GenesisError::NonZeroHash("parent_hash"));
    }
    if !header.prev_randao.is_zero() {
        return Err(GenesisError::NonZeroHash("prev_randao"));
    }
    if header.receipts_root != EMPTY_TRIE_ROOT {
        return Err(GenesisError::BadReceiptsRoot);
    }
    if header.gas_limit == 0 {
        return Err(GenesisError::ZeroField("gas_limit"));
    }
    if header.base_fee_per_gas == 0 {
        return Err(GenesisError::ZeroField("base_fee_per_gas"));
    }
    if header.block_hash.is_zero() {
        return Err(GenesisError::ZeroBlockHash);
    }
    if header.extra_data.len() > MAX_EXTRA_DATA_BYTES {
        return Err(GenesisError::ExtraDataTooLong {
            max: MAX_EXTRA_DATA_BYTES,
            got: header.extra_data.len(),
        });
    }
    Ok(())
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// A structurally valid execution header for tests.
    pub fn valid_execution_header() -> ExecutionHeader {
        ExecutionHeader {
            parent_hash: Hash::ZERO,
            receipts_root: EMPTY_TRIE_ROOT,
            prev_randao: Hash::ZERO,
            block_number: 0,
            gas_limit: 30_000_000,
            gas_used: 0,
            base_fee_per_gas: 1_000_000_000,
            blob_gas_used: 0,
            excess_blob_gas: 0,
            block_hash: Hash::from_bytes(b"genesis execution block"),
            extra_data: vec![],
        }
    }

    /// A minimal valid app genesis with `n` distinct deposits.
    pub fn valid_app_genesis(n: u8) -> AppGenesis {
        let deposits = (0..n.max(1))
            .map(|i| Deposit {
                pubkey: BlsPublicKey([i + 1; 48]),
                credentials: Hash::from_bytes(&[i]),
                amount: 32_000_000_000,
            })
            .collect();
        AppGenesis {
            fork_version: "0x00000001".to_string(),
            deposits,
            execution_payload_header: valid_execution_header(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;

    #[test]
    fn test_valid_genesis_passes() {
        assert!(valid_app_genesis(3).validate().is_ok());
    }

    #[test]
    fn test_fork_version_shape() {
        assert!(validate_fork_version("0x00000000").is_ok());
        assert!(validate_fork_version("0xdeadBEEF").is_ok());

        for bad in ["00000000", "0x0000000", "0x000000000", "0x0000zz00", ""] {
            assert!(
                matches!(
                    validate_fork_version(bad),
                    Err(GenesisError::InvalidForkVersion(_))
                ),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_empty_deposits_rejected() {
        assert_eq!(validate_deposits(&[]), Err(GenesisError::NoDeposits));
    }

    #[test]
    fn test_duplicate_deposit_rejected() {
        let mut genesis = valid_app_genesis(2);
        genesis.deposits[1].pubkey = genesis.deposits[0].pubkey;
        assert!(matches!(
            genesis.validate(),
            Err(GenesisError::DuplicateDeposit(_))
        ));
    }

    #[test]
    fn test_used_execution_block_rejected() {
        let mut header = valid_execution_header();
        header.gas_used = 21_000;
        assert_eq!(
            validate_execution_header(&header),
            Err(GenesisError::NonZeroField {
                field: "gas_used",
                got: 21_000
            })
        );

        let mut header = valid_execution_header();
        header.block_number = 5;
        assert!(validate_execution_header(&header).is_err());

        let mut header = valid_execution_header();
        header.parent_hash = Hash::from_bytes(b"parent");
        assert_eq!(
            validate_execution_header(&header),
            Err(GenesisError::NonZeroHash("parent_hash"))
        );
    }

    #[test]
    fn test_receipts_root_must_be_empty_trie() {
        let mut header = valid_execution_header();
        header.receipts_root = Hash::ZERO;
        assert_eq!(
            validate_execution_header(&header),
            Err(GenesisError::BadReceiptsRoot)
        );
    }

    #[test]
    fn test_dead_gas_market_rejected() {
        let mut header = valid_execution_header();
        header.gas_limit = 0;
        assert_eq!(
            validate_execution_header(&header),
            Err(GenesisError::ZeroField("gas_limit"))
        );

        let mut header = valid_execution_header();
        header.base_fee_per_gas = 0;
        assert!(validate_execution_header(&header).is_err());

        let mut header = valid_execution_header();
        header.block_hash = Hash::ZERO;
        assert_eq!(
            validate_execution_header(&header),
            Err(GenesisError::ZeroBlockHash)
        );
    }

    #[test]
    fn test_extra_data_cap() {
        let mut header = valid_execution_header();
        header.extra_data = vec![0u8; 32];
        assert!(validate_execution_header(&header).is_ok());

        header.extra_data = vec![0u8; 33];
        assert_eq!(
            validate_execution_header(&header),
            Err(GenesisError::ExtraDataTooLong { max: 32, got: 33 })
        );
    }

    #[test]
    fn test_app_genesis_json_round_trip() {
        let genesis = valid_app_genesis(2);
        let value = serde_json::to_value(&genesis).unwrap();
        let parsed = AppGenesis::from_json(&value).unwrap();
        assert_eq!(parsed.deposits, genesis.deposits);
        assert_eq!(
            parsed.execution_payload_header,
            genesis.execution_payload_header
        );
    }

    #[test]
    fn test_malformed_app_state_reports_error() {
        let value = serde_json::json!({"fork_version": 7});
        assert!(matches!(
            AppGenesis::from_json(&value),
            Err(GenesisError::MalformedAppState(_))
        ));
    }
}
