//! Probe and metrics servers
//!
//! Provides HTTP endpoints for:
//! - `/healthz` - Liveness probe (is the process alive?)
//! - `/readyz` - Readiness probe (is the operator ready to serve?)
//! - `/metrics` - Prometheus metrics, optionally behind TLS

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::metrics::Metrics;

/// Bind address for the probe server
const PROBE_ADDR: &str = "0.0.0.0:8081";

/// Bind address for the metrics server
const METRICS_ADDR: &str = "0.0.0.0:8443";

/// Shared state for the probe and metrics endpoints
pub struct HealthState {
    ready: RwLock<bool>,
    pub metrics: Arc<Metrics>,
}

impl HealthState {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            ready: RwLock::new(false),
            metrics,
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Serve liveness and readiness probes
pub async fn run_probe_server(state: Arc<HealthState>) -> std::io::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state);

    let listener = TcpListener::bind(PROBE_ADDR).await?;
    tracing::info!("Probe server listening on {}", PROBE_ADDR);
    axum::serve(listener, app).await
}

/// Serve Prometheus metrics, with TLS when a certificate directory is set
pub async fn run_metrics_server(
    state: Arc<HealthState>,
    cert_path: Option<String>,
) -> std::io::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics))
        .with_state(state);

    let addr: SocketAddr = METRICS_ADDR.parse().expect("static address parses");

    match cert_path {
        Some(dir) => {
            let cert = Path::new(&dir).join("tls.crt");
            let key = Path::new(&dir).join("tls.key");
            tracing::info!(
                "Metrics server listening on {} with certificates from {}",
                METRICS_ADDR,
                dir
            );
            let config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
                .await
                .map_err(std::io::Error::other)?;
            axum_server::bind_rustls(addr, config)
                .serve(app.into_make_service())
                .await
        }
        None => {
            tracing::info!("Metrics server listening on {} without TLS", METRICS_ADDR);
            let listener = TcpListener::bind(addr).await?;
            axum::serve(listener, app).await
        }
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    if state.is_ready().await {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        state.metrics.encode(),
    )
}
