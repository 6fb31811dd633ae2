//! Tracing and telemetry initialization.
//!
//! Console logging always works; the OTLP trace exporter and the Prometheus
//! endpoint are both optional so a node degrades gracefully when no collector
//! is deployed next to it.

use axum::{response::IntoResponse, routing::get, Router};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
    Resource,
};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP exporter: {0}")]
    ExporterBuild(#[from] opentelemetry_otlp::ExporterBuildError),

    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Telemetry configuration, derived from the node config.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// OTLP endpoint for traces (e.g. `http://localhost:4317`); console-only
    /// logging when unset.
    pub otlp_endpoint: Option<String>,
    /// Trace sampling ratio, 0.0 to 1.0.
    pub sampling_ratio: f64,
    /// Serve `/metrics`, `/health`, `/ready`.
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            sampling_ratio: 1.0,
            metrics_enabled: true,
            metrics_port: 26_660,
        }
    }
}

/// Initialize tracing and telemetry.
///
/// The OTLP exporter buffers in memory and connects lazily; a temporarily
/// unavailable collector costs dropped spans, never node availability.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let resource = Resource::builder()
        .with_attributes([
            opentelemetry::KeyValue::new(SERVICE_NAME, "causeway-node"),
            opentelemetry::KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        ])
        .build();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,causeway=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    let (otel_layer, tracer_provider) = if let Some(endpoint) = &config.otlp_endpoint {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let tracer_provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_sampler(Sampler::TraceIdRatioBased(config.sampling_ratio))
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource)
            .build();

        let tracer = tracer_provider.tracer("causeway");
        (Some(OpenTelemetryLayer::new(tracer)), Some(tracer_provider))
    } else {
        (None, None)
    };

    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer);

    tracing::subscriber::set_global_default(subscriber)?;

    let (metrics_handle, ready_flag) = if config.metrics_enabled {
        let ready_flag = Arc::new(AtomicBool::new(false));
        let handle = start_metrics_server(config.metrics_port, ready_flag.clone());
        (Some(handle), Some(ready_flag))
    } else {
        (None, None)
    };

    Ok(TelemetryGuard {
        tracer_provider,
        metrics_handle,
        ready_flag,
    })
}

/// Guard that shuts down telemetry on drop.
///
/// Call [`TelemetryGuard::shutdown`] for a clean exit that flushes pending
/// spans; the `Drop` fallback cannot wait on the async flush.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
    metrics_handle: Option<tokio::task::JoinHandle<()>>,
    ready_flag: Option<Arc<AtomicBool>>,
}

impl TelemetryGuard {
    /// Flush pending spans (bounded wait) and stop the metrics server.
    pub async fn shutdown(mut self) {
        use std::time::Duration;

        if let Some(provider) = self.tracer_provider.take() {
            let _ = tokio::time::timeout(
                Duration::from_secs(5),
                tokio::task::spawn_blocking(move || {
                    let _ = provider.shutdown();
                }),
            )
            .await;
        }

        if let Some(handle) = self.metrics_handle.take() {
            handle.abort();
        }
    }

    /// Flip the readiness probe. Called once startup completes and again on
    /// shutdown.
    pub fn set_ready(&self, ready: bool) {
        if let Some(flag) = &self.ready_flag {
            flag.store(ready, Ordering::SeqCst);
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            let _ = provider.shutdown();
        }
        if let Some(handle) = self.metrics_handle.take() {
            handle.abort();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Metrics HTTP server
// ═══════════════════════════════════════════════════════════════════════════

/// Serve `/metrics` (Prometheus text format), `/health` (liveness), and
/// `/ready` (readiness).
fn start_metrics_server(port: u16, ready_flag: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(move || ready_handler(ready_flag.clone())));

        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        tracing::info!(port, "starting metrics server on http://{}", addr);

        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = ?e, port, "failed to bind metrics server");
                return;
            }
        };

        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = ?e, "metrics server error");
        }
    })
}

async fn metrics_handler() -> impl axum::response::IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = ?e, "failed to encode metrics");
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "failed to encode metrics",
        )
            .into_response();
    }

    (
        [(
            axum::http::header::CONTENT_TYPE,
            encoder.format_type().to_string(),
        )],
        buffer,
    )
        .into_response()
}

async fn health_handler() -> impl axum::response::IntoResponse {
    axum::Json(ProbeResponse {
        status: "ok",
        ready: true,
    })
}

async fn ready_handler(ready_flag: Arc<AtomicBool>) -> impl axum::response::IntoResponse {
    if ready_flag.load(Ordering::SeqCst) {
        (
            axum::http::StatusCode::OK,
            axum::Json(ProbeResponse {
                status: "ready",
                ready: true,
            }),
        )
    } else {
        (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(ProbeResponse {
                status: "not_ready",
                ready: false,
            }),
        )
    }
}

#[derive(Serialize)]
struct ProbeResponse {
    status: &'static str,
    ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert!(config.otlp_endpoint.is_none());
        assert_eq!(config.sampling_ratio, 1.0);
        assert!(config.metrics_enabled);
        assert_eq!(config.metrics_port, 26_660);
    }

    #[tokio::test]
    async fn test_ready_flag_gates_probe() {
        let ready_flag = Arc::new(AtomicBool::new(false));

        let guard = TelemetryGuard {
            tracer_provider: None,
            metrics_handle: None,
            ready_flag: Some(ready_flag.clone()),
        };

        assert!(!ready_flag.load(Ordering::SeqCst));
        guard.set_ready(true);
        assert!(ready_flag.load(Ordering::SeqCst));
        guard.set_ready(false);
        assert!(!ready_flag.load(Ordering::SeqCst));
    }
}
