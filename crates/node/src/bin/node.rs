//! Causeway node binary.
//!
//! Runs the consensus-application bridge in standalone mode: configuration is
//! validated, storage and telemetry come up, and the service waits for an
//! engine adapter to drive it. Wiring a live consensus engine and execution
//! client happens in the deployment-specific adapter, not here.
//!
//! # Usage
//!
//! ```bash
//! # Start with a configuration file
//! causeway-node --config node.toml
//!
//! # Override the data directory
//! causeway-node --config node.toml --data-dir /var/lib/causeway
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use causeway_abci::{
    BlockBuilder, Blockchain, BlockchainError, BuilderError, FinalizeBlockRequest, MemoryStore,
    ProcessProposalRequest, RequestContext, RootStore, Service, ServiceConfig, SlotData, State,
};
use causeway_node::config::DbBackend;
use causeway_node::{
    init_telemetry, spawn_signal_handler, Node, NodeConfig, PrometheusSink, RocksDbStore,
    TelemetryConfig,
};
use causeway_types::{AppGenesis, ChainSpec, ConsensusParams, Genesis, ValidatorUpdate};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Causeway consensus-bridge node.
#[derive(Parser, Debug)]
#[command(name = "causeway-node")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Data directory (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Genesis file path (overrides config)
    #[arg(long)]
    genesis: Option<PathBuf>,
}

/// Standalone-mode chain: accepts every proposal and records only the block
/// marker, so a harness network makes progress without an execution layer.
struct StandaloneChain;

#[async_trait]
impl Blockchain for StandaloneChain {
    async fn process_genesis_data(
        &self,
        state: &mut State,
        genesis: &AppGenesis,
    ) -> Result<Vec<ValidatorUpdate>, BlockchainError> {
        state.branch_mut().set(b"genesis/fork_version", genesis.fork_version.as_bytes());
        Ok(genesis
            .deposits
            .iter()
            .map(|d| ValidatorUpdate {
                pubkey: d.pubkey,
                power: (d.amount / 1_000_000_000) as i64,
            })
            .collect())
    }

    async fn process_proposal(
        &self,
        _state: &mut State,
        _req: &ProcessProposalRequest,
    ) -> Result<(), BlockchainError> {
        Ok(())
    }

    async fn finalize_block(
        &self,
        state: &mut State,
        req: &FinalizeBlockRequest,
    ) -> Result<Vec<ValidatorUpdate>, BlockchainError> {
        state
            .branch_mut()
            .set(format!("block/{}", req.height).as_bytes(), req.hash.as_bytes());
        Ok(vec![])
    }
}

/// Standalone-mode builder: empty payloads.
struct StandaloneBuilder;

#[async_trait]
impl BlockBuilder for StandaloneBuilder {
    async fn build_block_and_sidecars(
        &self,
        _ctx: &RequestContext,
        _slot: SlotData,
    ) -> Result<(Vec<u8>, Vec<u8>), BuilderError> {
        Ok((vec![], vec![]))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let contents = fs::read_to_string(&cli.config)
        .with_context(|| format!("failed to read config file: {}", cli.config.display()))?;
    let mut config = NodeConfig::from_toml(&contents)
        .with_context(|| format!("failed to parse config file: {}", cli.config.display()))?;

    if let Some(data_dir) = cli.data_dir {
        config.node.data_dir = data_dir;
    }
    if let Some(genesis) = cli.genesis {
        config.node.genesis_path = genesis;
    }

    // Hard floors: a node below them cannot keep up with the network's
    // timing assumptions, so refuse to start.
    config.validate().context("invalid node configuration")?;

    // In a generated test network, replace the flat peer list with this
    // node's tree edges before anything dials out.
    config
        .shape_testnet_topology(&mut rand::rngs::OsRng)
        .context("failed to shape testnet topology")?;

    let telemetry_guard = init_telemetry(&TelemetryConfig {
        otlp_endpoint: config.telemetry.otlp_endpoint.clone(),
        sampling_ratio: 1.0,
        metrics_enabled: config.telemetry.metrics_enabled,
        metrics_port: config.telemetry.metrics_port,
    })?;

    info!(config = %cli.config.display(), "causeway node starting");

    let spec = ChainSpec::devnet();

    // Self-validation failure of our own defaults is a build bug, not a
    // runtime condition; this is the one place allowed to die over it.
    let default_params = ConsensusParams::for_chain(&spec)
        .expect("default consensus parameters must self-validate");

    let genesis_raw = fs::read_to_string(&config.node.genesis_path).with_context(|| {
        format!(
            "failed to read genesis file: {}",
            config.node.genesis_path.display()
        )
    })?;
    let genesis: Genesis =
        serde_json::from_str(&genesis_raw).context("failed to parse genesis file")?;
    genesis
        .consensus_params
        .validate(&spec)
        .context("genesis consensus parameters are incompatible with this binary")?;
    if genesis.consensus_params != default_params {
        tracing::warn!("genesis consensus parameters differ from this binary's defaults");
    }

    fs::create_dir_all(&config.node.data_dir)?;

    let service_config = ServiceConfig::new(genesis.chain_id.clone(), genesis.consensus_params.clone())
        .with_min_retain_blocks(config.pruning.effective_min_retain_blocks());

    let (root, rocks): (Arc<dyn RootStore>, Option<Arc<RocksDbStore>>) =
        match config.storage.backend {
            DbBackend::Rocksdb => {
                let db_path = config.node.data_dir.join("db");
                let store = Arc::new(RocksDbStore::open(&db_path).with_context(|| {
                    format!("failed to open database at {}", db_path.display())
                })?);
                info!(path = %db_path.display(), "storage opened");
                (store.clone() as Arc<dyn RootStore>, Some(store))
            }
            DbBackend::Memory => (Arc::new(MemoryStore::new()), None),
        };

    let service = Service::new(
        service_config,
        Arc::new(StandaloneChain),
        Arc::new(StandaloneBuilder),
        root,
        Arc::new(PrometheusSink),
    );

    let node = Node::new(service, rocks);
    spawn_signal_handler(node.shutdown_token());

    telemetry_guard.set_ready(true);
    info!(chain_id = %genesis.chain_id, "node started, press Ctrl+C to stop");

    node.run_until_shutdown().await;

    telemetry_guard.set_ready(false);
    telemetry_guard.shutdown().await;
    info!("node shutdown complete");
    Ok(())
}
