//! Production wiring for the causeway consensus bridge.
//!
//! The `causeway-abci` crate owns the protocol state machine; this crate owns
//! everything a deployed node needs around it:
//!
//! - [`config`]: node-local TOML configuration with hard-floor validation
//! - [`storage`]: the RocksDB-backed root store
//! - [`metrics`]: Prometheus registry and the telemetry sink
//! - [`telemetry`]: tracing/OTLP setup and the probe endpoints
//! - [`runner`]: startup, shutdown signals, and the force-exit watchdog

pub mod config;
pub mod metrics;
pub mod runner;
pub mod storage;
pub mod telemetry;

pub use config::{ConfigError, NodeConfig, PruningMode};
pub use metrics::PrometheusSink;
pub use runner::{spawn_signal_handler, Node, FORCE_EXIT_AFTER};
pub use storage::RocksDbStore;
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryError, TelemetryGuard};
