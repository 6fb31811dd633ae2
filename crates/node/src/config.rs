//! Node-local configuration.
//!
//! Nothing here is part of consensus: every value may differ per node, subject
//! only to hard floors that keep a node compatible with the network's timing
//! assumptions. An invalid configuration is fatal at startup, before the node
//! joins the network.

use causeway_types::{PeerTopology, TopologyError};
use rand::Rng;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Floor on the proposal timeout.
pub const MIN_TIMEOUT_PROPOSE: Duration = Duration::from_secs(2);
/// Floor on the prevote timeout.
pub const MIN_TIMEOUT_PREVOTE: Duration = Duration::from_secs(2);
/// Floor on the precommit timeout.
pub const MIN_TIMEOUT_PRECOMMIT: Duration = Duration::from_secs(2);
/// Floor on the commit timeout.
pub const MIN_TIMEOUT_COMMIT: Duration = Duration::from_millis(500);

/// Configuration validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} {got:?} is below the floor {floor:?}")]
    TimeoutBelowFloor {
        name: &'static str,
        floor: Duration,
        got: Duration,
    },

    #[error("pruning mode \"custom\" requires min_retain_blocks > 0")]
    CustomPruningWithoutRetention,
}

/// Top-level node configuration, loaded from TOML.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,

    #[serde(default)]
    pub consensus: ConsensusTimeouts,

    #[serde(default)]
    pub p2p: P2pSection,

    #[serde(default)]
    pub pruning: PruningSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub telemetry: TelemetrySection,

    #[serde(default)]
    pub testnet: TestnetSection,
}

/// Generated test-network membership.
///
/// When `validators` is non-zero, this node is part of a reproducible test
/// topology and its peer connectivity is shaped at startup (see
/// [`NodeConfig::shape_testnet_topology`]).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TestnetSection {
    /// Number of validators in the generated network (0 = not a testnet).
    #[serde(default)]
    pub validators: u64,

    /// This node's index in the ordered validator list; unset for a
    /// non-validator node that should attach to the network's leaves.
    #[serde(default)]
    pub validator_index: Option<u64>,
}

/// Node identity and paths.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSection {
    /// Data directory for the store and persisted schedules.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Path to the genesis document.
    #[serde(default = "default_genesis_path")]
    pub genesis_path: PathBuf,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            genesis_path: default_genesis_path(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_genesis_path() -> PathBuf {
    PathBuf::from("./genesis.json")
}

/// Engine timeout tuning, all floored.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusTimeouts {
    #[serde(default = "default_timeout_propose_ms")]
    pub timeout_propose_ms: u64,

    #[serde(default = "default_timeout_prevote_ms")]
    pub timeout_prevote_ms: u64,

    #[serde(default = "default_timeout_precommit_ms")]
    pub timeout_precommit_ms: u64,

    #[serde(default = "default_timeout_commit_ms")]
    pub timeout_commit_ms: u64,
}

impl Default for ConsensusTimeouts {
    fn default() -> Self {
        Self {
            timeout_propose_ms: default_timeout_propose_ms(),
            timeout_prevote_ms: default_timeout_prevote_ms(),
            timeout_precommit_ms: default_timeout_precommit_ms(),
            timeout_commit_ms: default_timeout_commit_ms(),
        }
    }
}

fn default_timeout_propose_ms() -> u64 {
    3_000
}

fn default_timeout_prevote_ms() -> u64 {
    2_000
}

fn default_timeout_precommit_ms() -> u64 {
    2_000
}

fn default_timeout_commit_ms() -> u64 {
    500
}

impl ConsensusTimeouts {
    pub fn timeout_propose(&self) -> Duration {
        Duration::from_millis(self.timeout_propose_ms)
    }

    pub fn timeout_prevote(&self) -> Duration {
        Duration::from_millis(self.timeout_prevote_ms)
    }

    pub fn timeout_precommit(&self) -> Duration {
        Duration::from_millis(self.timeout_precommit_ms)
    }

    pub fn timeout_commit(&self) -> Duration {
        Duration::from_millis(self.timeout_commit_ms)
    }
}

/// Peer connectivity caps. The topology shaper overrides these for validators
/// placed in the tree; they apply as-is to free-standing nodes.
#[derive(Debug, Clone, Deserialize)]
pub struct P2pSection {
    #[serde(default = "default_max_inbound_peers")]
    pub max_inbound_peers: u32,

    #[serde(default = "default_max_outbound_peers")]
    pub max_outbound_peers: u32,

    /// Addresses this node always dials, `host:port` form.
    #[serde(default)]
    pub persistent_peers: Vec<String>,
}

impl Default for P2pSection {
    fn default() -> Self {
        Self {
            max_inbound_peers: default_max_inbound_peers(),
            max_outbound_peers: default_max_outbound_peers(),
            persistent_peers: vec![],
        }
    }
}

fn default_max_inbound_peers() -> u32 {
    causeway_types::DEFAULT_MAX_INBOUND
}

fn default_max_outbound_peers() -> u32 {
    causeway_types::DEFAULT_MAX_OUTBOUND
}

/// History pruning preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PruningMode {
    /// Keep everything.
    #[default]
    Nothing,
    /// Keep a conservative recent window.
    Default,
    /// Keep exactly `min_retain_blocks`.
    Custom,
}

/// Recent window retained by [`PruningMode::Default`].
pub const DEFAULT_RETAIN_BLOCKS: u64 = 362_880;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PruningSection {
    #[serde(default)]
    pub mode: PruningMode,

    /// Blocks to retain in `custom` mode.
    #[serde(default)]
    pub min_retain_blocks: u64,
}

impl PruningSection {
    /// The `min_retain_blocks` value handed to the retention calculator;
    /// zero disables pruning.
    pub fn effective_min_retain_blocks(&self) -> u64 {
        match self.mode {
            PruningMode::Nothing => 0,
            PruningMode::Default => DEFAULT_RETAIN_BLOCKS,
            PruningMode::Custom => self.min_retain_blocks,
        }
    }
}

/// Database backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbBackend {
    #[default]
    Rocksdb,
    /// Ephemeral store, for harness runs.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default)]
    pub backend: DbBackend,

    /// Cache branch reads across blocks within a height.
    #[serde(default = "default_inter_block_cache")]
    pub inter_block_cache: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: DbBackend::default(),
            inter_block_cache: default_inter_block_cache(),
        }
    }
}

fn default_inter_block_cache() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelemetrySection {
    /// OTLP endpoint for traces; console-only logging when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    26_660
}

impl NodeConfig {
    /// Parse a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Enforce the hard floors. Called once at startup; a failure here is
    /// fatal before the node joins the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let floors = [
            (
                "timeout_propose",
                MIN_TIMEOUT_PROPOSE,
                self.consensus.timeout_propose(),
            ),
            (
                "timeout_prevote",
                MIN_TIMEOUT_PREVOTE,
                self.consensus.timeout_prevote(),
            ),
            (
                "timeout_precommit",
                MIN_TIMEOUT_PRECOMMIT,
                self.consensus.timeout_precommit(),
            ),
            (
                "timeout_commit",
                MIN_TIMEOUT_COMMIT,
                self.consensus.timeout_commit(),
            ),
        ];
        for (name, floor, got) in floors {
            if got < floor {
                return Err(ConfigError::TimeoutBelowFloor { name, floor, got });
            }
        }

        if self.pruning.mode == PruningMode::Custom && self.pruning.min_retain_blocks == 0 {
            return Err(ConfigError::CustomPruningWithoutRetention);
        }
        Ok(())
    }

    /// Shape peer connectivity for a generated test network.
    ///
    /// `p2p.persistent_peers` is interpreted as the ordered validator address
    /// list. It is replaced by this node's tree edges, and the peer caps are
    /// overridden by the assigned slot: zero for non-leaf validators (strict
    /// topology enforcement), the generous defaults for leaves and
    /// non-validator nodes.
    ///
    /// No-op when `testnet.validators` is zero.
    pub fn shape_testnet_topology<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<(), TopologyError> {
        if self.testnet.validators == 0 {
            return Ok(());
        }

        let topology = PeerTopology::build(self.testnet.validators as usize)?;
        let slot = match self.testnet.validator_index {
            Some(index) => topology.slot(index as usize)?.clone(),
            None => topology.attach_full_node(rng)?,
        };

        self.p2p.persistent_peers = slot
            .peers
            .iter()
            .filter_map(|&i| self.p2p.persistent_peers.get(i).cloned())
            .collect();
        self.p2p.max_inbound_peers = slot.max_inbound;
        self.p2p.max_outbound_peers = slot.max_outbound;
        Ok(())
    }
}
