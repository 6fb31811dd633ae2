//! Node lifecycle: startup, shutdown signals, and the bounded force-exit.
//!
//! The consensus engine drives the [`Service`] serially from its own task;
//! this module owns everything around that: the shutdown signal handler, the
//! request-context plumbing that lets an in-flight `prepare_proposal` observe
//! shutdown, and the watchdog that guarantees a hung shutdown path cannot
//! keep the process alive forever.

use crate::storage::RocksDbStore;
use causeway_abci::{RequestContext, Service};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long a graceful shutdown may take before the process is killed.
pub const FORCE_EXIT_AFTER: Duration = Duration::from_secs(5 * 60);

/// A running node: the bridge service plus its lifecycle plumbing.
pub struct Node {
    service: Service,
    /// Present when the RocksDB backend is in use; the delay schedule is
    /// persisted here after every commit and restored on startup.
    storage: Option<Arc<RocksDbStore>>,
    shutdown: CancellationToken,
}

impl Node {
    /// Assemble a node around a constructed service.
    ///
    /// If `storage` carries a persisted delay schedule, it is restored so the
    /// pacing schedule survives restarts.
    pub fn new(mut service: Service, storage: Option<Arc<RocksDbStore>>) -> Self {
        if let Some(store) = &storage {
            match store.delay_schedule() {
                Ok(Some(bytes)) => {
                    if let Err(e) = service.restore_delay_schedule(&bytes) {
                        warn!(error = %e, "ignoring corrupt persisted delay schedule");
                    } else {
                        info!("restored block delay schedule");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "could not read persisted delay schedule"),
            }
        }

        Self {
            service,
            storage,
            shutdown: CancellationToken::new(),
        }
    }

    /// The service, for the engine adapter to drive.
    pub fn service_mut(&mut self) -> &mut Service {
        &mut self.service
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// A request context tied to the node's shutdown: in-flight calls observe
    /// cancellation the moment shutdown starts.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_token(self.shutdown.child_token())
    }

    /// Persist the delay schedule; called by the engine adapter after each
    /// commit and once more during shutdown.
    pub fn persist_delay_schedule(&self) {
        if let Some(store) = &self.storage {
            if let Err(e) = store.put_delay_schedule(&self.service.delay_schedule_bytes()) {
                error!(error = %e, "failed to persist delay schedule");
            }
        }
    }

    /// Block until shutdown is requested, then clean up.
    ///
    /// A watchdog forces the process down if cleanup exceeds
    /// [`FORCE_EXIT_AFTER`].
    pub async fn run_until_shutdown(self) {
        self.shutdown.cancelled().await;
        info!("shutdown requested, stopping node");

        let watchdog = spawn_force_exit_watchdog(FORCE_EXIT_AFTER);

        self.persist_delay_schedule();

        watchdog.abort();
        info!("node stopped");
    }
}

/// Watch for SIGINT/SIGTERM and cancel the token.
pub fn spawn_signal_handler(shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received Ctrl+C"),
            _ = terminate => info!("received SIGTERM"),
        }

        shutdown.cancel();
    })
}

/// Kill the process if shutdown takes longer than `grace`.
fn spawn_force_exit_watchdog(grace: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        error!(
            grace_secs = grace.as_secs(),
            "shutdown did not complete in time, forcing exit"
        );
        std::process::exit(1);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway_abci::{
        BlockBuilder, Blockchain, BlockchainError, BuilderError, MemoryStore, NoopTelemetry,
        ServiceConfig, SlotData, State,
    };
    use causeway_types::{AppGenesis, ChainSpec, ConsensusParams, ValidatorUpdate};

    struct InertChain;

    #[async_trait::async_trait]
    impl Blockchain for InertChain {
        async fn process_genesis_data(
            &self,
            _state: &mut State,
            _genesis: &AppGenesis,
        ) -> Result<Vec<ValidatorUpdate>, BlockchainError> {
            Ok(vec![])
        }

        async fn process_proposal(
            &self,
            _state: &mut State,
            _req: &causeway_abci::ProcessProposalRequest,
        ) -> Result<(), BlockchainError> {
            Ok(())
        }

        async fn finalize_block(
            &self,
            _state: &mut State,
            _req: &causeway_abci::FinalizeBlockRequest,
        ) -> Result<Vec<ValidatorUpdate>, BlockchainError> {
            Ok(vec![])
        }
    }

    struct InertBuilder;

    #[async_trait::async_trait]
    impl BlockBuilder for InertBuilder {
        async fn build_block_and_sidecars(
            &self,
            _ctx: &RequestContext,
            _slot: SlotData,
        ) -> Result<(Vec<u8>, Vec<u8>), BuilderError> {
            Ok((vec![], vec![]))
        }
    }

    fn test_node() -> Node {
        let params = ConsensusParams::for_chain(&ChainSpec::devnet()).unwrap();
        let service = Service::new(
            ServiceConfig::new("causeway-devnet-1", params),
            Arc::new(InertChain),
            Arc::new(InertBuilder),
            Arc::new(MemoryStore::new()),
            Arc::new(NoopTelemetry),
        );
        Node::new(service, None)
    }

    #[tokio::test]
    async fn test_request_contexts_observe_shutdown() {
        let node = test_node();
        let ctx = node.request_context();
        assert!(!ctx.is_cancelled());

        node.shutdown_token().cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_returns_after_shutdown() {
        let node = test_node();
        let shutdown = node.shutdown_token();

        let run = tokio::spawn(node.run_until_shutdown());
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run must return once shutdown is requested")
            .unwrap();
    }

    #[tokio::test]
    async fn test_contexts_are_independent_of_each_other() {
        let node = test_node();
        let a = node.request_context();
        let b = node.request_context();

        a.cancel();
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled(), "one request's cancellation must not leak");
    }
}
