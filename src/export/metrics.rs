use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::bind_addr;

/// Label names shared by every peer metric family.
pub const PEER_LABELS: [&str; 3] = ["interface", "public_key", "client_name"];

/// Namespace of the peer metric families.
const PEER_NAMESPACE: &str = "awg";

/// Namespace of the exporter's own health metrics.
const EXPORTER_NAMESPACE: &str = "awg_exporter";

/// Prometheus registry for peer gauges and exporter health, plus the HTTP
/// server exposing it.
///
/// Gauge updates are atomic per label tuple, so scrapes may run while a
/// cycle is updating values.
pub struct ExporterMetrics {
    registry: Registry,
    addr: String,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,

    // === Peer metrics ===
    /// Total bytes received from peer.
    pub received_bytes: GaugeVec,
    /// Total bytes sent to peer.
    pub sent_bytes: GaugeVec,
    /// Receive rate in bytes per second.
    pub received_rate: GaugeVec,
    /// Send rate in bytes per second.
    pub sent_rate: GaugeVec,
    /// Last handshake, seconds since epoch (0 if never).
    pub latest_handshake: GaugeVec,

    // === Exporter health ===
    /// Collection cycles by result (success/error).
    pub cycles: CounterVec,
    /// Peer lines rejected by the parser.
    pub line_parse_errors: Counter,
    /// Name source load failures by source.
    pub name_source_errors: CounterVec,
    /// Peers currently held by the rate tracker.
    pub peers_tracked: Gauge,
    /// Peers removed after going missing.
    pub peers_expired: Counter,
    /// Entries in the most recently loaded name directory.
    pub name_directory_entries: Gauge,
    /// Duration of a collection cycle.
    pub cycle_duration: Histogram,
}

impl ExporterMetrics {
    /// Creates the metrics with everything registered. `addr` is the
    /// listen address for [`start`](Self::start).
    pub fn new(addr: &str) -> Result<Self> {
        let registry = Registry::new();

        // === Peer metrics ===
        let received_bytes = peer_gauge("received_bytes_total", "Total bytes received from peer")?;
        let sent_bytes = peer_gauge("sent_bytes_total", "Total bytes sent to peer")?;
        let received_rate = peer_gauge(
            "received_rate_bytes_per_sec",
            "Data receive rate in bytes per second",
        )?;
        let sent_rate = peer_gauge(
            "sent_rate_bytes_per_sec",
            "Data send rate in bytes per second",
        )?;
        let latest_handshake = peer_gauge(
            "latest_handshake_seconds",
            "Time of last handshake in seconds since epoch (0 if never)",
        )?;

        // === Exporter health ===
        let cycles = CounterVec::new(
            Opts::new("cycles_total", "Total collection cycles by result.")
                .namespace(EXPORTER_NAMESPACE),
            &["result"],
        )?;
        let line_parse_errors = Counter::with_opts(
            Opts::new(
                "line_parse_errors_total",
                "Total dump lines rejected by the parser.",
            )
            .namespace(EXPORTER_NAMESPACE),
        )?;
        let name_source_errors = CounterVec::new(
            Opts::new(
                "name_source_errors_total",
                "Total name source load failures by source.",
            )
            .namespace(EXPORTER_NAMESPACE),
            &["source"],
        )?;
        let peers_tracked = Gauge::with_opts(
            Opts::new("peers_tracked", "Number of peers held by the rate tracker.")
                .namespace(EXPORTER_NAMESPACE),
        )?;
        let peers_expired = Counter::with_opts(
            Opts::new(
                "peers_expired_total",
                "Total peers removed after missing from the dump.",
            )
            .namespace(EXPORTER_NAMESPACE),
        )?;
        let name_directory_entries = Gauge::with_opts(
            Opts::new(
                "name_directory_entries",
                "Entries in the most recently loaded name directory.",
            )
            .namespace(EXPORTER_NAMESPACE),
        )?;
        let cycle_duration = Histogram::with_opts(
            HistogramOpts::new(
                "cycle_duration_seconds",
                "Time to run one collection cycle.",
            )
            .namespace(EXPORTER_NAMESPACE)
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        )?;

        // Peer
        registry.register(Box::new(received_bytes.clone()))?;
        registry.register(Box::new(sent_bytes.clone()))?;
        registry.register(Box::new(received_rate.clone()))?;
        registry.register(Box::new(sent_rate.clone()))?;
        registry.register(Box::new(latest_handshake.clone()))?;

        // Health
        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(line_parse_errors.clone()))?;
        registry.register(Box::new(name_source_errors.clone()))?;
        registry.register(Box::new(peers_tracked.clone()))?;
        registry.register(Box::new(peers_expired.clone()))?;
        registry.register(Box::new(name_directory_entries.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;

        Ok(Self {
            registry,
            addr: addr.to_string(),
            shutdown: parking_lot::Mutex::new(None),
            received_bytes,
            sent_bytes,
            received_rate,
            sent_rate,
            latest_handshake,
            cycles,
            line_parse_errors,
            name_source_errors,
            peers_tracked,
            peers_expired,
            name_directory_entries,
            cycle_duration,
        })
    }

    /// Returns the peer gauge families in a fixed order.
    pub fn peer_families(&self) -> [&GaugeVec; 5] {
        [
            &self.received_bytes,
            &self.sent_bytes,
            &self.received_rate,
            &self.sent_rate,
            &self.latest_handshake,
        ]
    }

    /// Encodes the current registry contents in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        encode(&self.registry)
    }

    /// Starts the HTTP server serving /metrics and /healthz.
    ///
    /// Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr> {
        let bind_addr = bind_addr(&self.addr);

        let app_state = Arc::new(AppState {
            registry: self.registry.clone(),
        });

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(healthz_handler))
            .with_state(app_state);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("listening on {bind_addr}"))?;

        let local_addr = listener.local_addr().context("getting local address")?;

        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            tracing::info!(addr = %local_addr, "metrics server started");

            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    cancel.cancelled().await;
                })
                .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "metrics server error");
            }
        });

        Ok(local_addr)
    }

    /// Gracefully shuts down the metrics server.
    pub async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }

        Ok(())
    }
}

fn peer_gauge(name: &str, help: &str) -> Result<GaugeVec> {
    Ok(GaugeVec::new(
        Opts::new(name, help).namespace(PEER_NAMESPACE),
        &PEER_LABELS,
    )?)
}

fn encode(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("encoding metrics")?;

    String::from_utf8(buffer).context("converting metrics to string")
}

/// Shared state for axum handlers.
struct AppState {
    registry: Registry,
}

/// GET /metrics - Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match encode(&state.registry) {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "encoding metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "encoding error").into_response()
        }
    }
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}
