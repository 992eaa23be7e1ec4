//! Local HTTP bridge for a browser-extension host.
//!
//! The extension (or its native-messaging host) pushes inbound messages and
//! polls the read models:
//!
//! ```text
//! Extension ──→ POST /ingest ──→ aggregator queue ──→ Engine
//!           ←── GET /snapshot/:tab, /histogram/:tab, /report
//! ```
//!
//! The server binds to loopback only.

use crate::collector::types::{InboundMessage, TabId};
use crate::core::bucketing::Histogram;
use crate::core::report::{GlobalReport, TabSnapshot};
use crate::runtime::AggregatorHandle;
use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Response from ingest endpoint
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub status: String,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /ingest
///
/// Queues one inbound message. Returns as soon as it is queued; reads
/// observe it once the aggregator has applied it.
async fn ingest(
    State(aggregator): State<Arc<AggregatorHandle>>,
    Json(message): Json<InboundMessage>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    aggregator.sink().send(message).map_err(|e| {
        tracing::warn!("Rejected inbound message: {}", e);
        let code = if e.is_recipient_gone() {
            "SHUTTING_DOWN"
        } else {
            "QUEUE_FULL"
        };
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: e.to_string(),
                code: code.to_string(),
            }),
        )
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            status: "queued".to_string(),
        }),
    ))
}

/// GET /snapshot/:tab
async fn snapshot(
    State(aggregator): State<Arc<AggregatorHandle>>,
    Path(tab): Path<TabId>,
) -> Json<TabSnapshot> {
    Json(aggregator.get_snapshot(tab))
}

/// GET /histogram/:tab
async fn histogram(
    State(aggregator): State<Arc<AggregatorHandle>>,
    Path(tab): Path<TabId>,
) -> Result<Json<Histogram>, ApiError> {
    aggregator.get_histogram(tab).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No histogram available for tab {tab}"),
                code: "NO_HISTOGRAM".to_string(),
            }),
        )
    })
}

/// GET /report
async fn report(State(aggregator): State<Arc<AggregatorHandle>>) -> Json<GlobalReport> {
    Json(aggregator.get_global_report())
}

/// Build the router over a running aggregator.
pub fn router(aggregator: Arc<AggregatorHandle>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/snapshot/:tab", get(snapshot))
        .route("/histogram/:tab", get(histogram))
        .route("/report", get(report))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(aggregator)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    aggregator: Arc<AggregatorHandle>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(aggregator);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Privacy Origin server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
