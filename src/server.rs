//! HTTP server for exposing OBD readings.
//!
//! This module provides an Axum-based HTTP server that serves the `/metrics`
//! endpoint for Prometheus scraping, a `/health` endpoint for health checks
//! and the exporter's own counters on `/exporter/metrics`.

use crate::acquisition::{AcquisitionHandle, AcquisitionState};
use crate::error::{ObdError, Result};
use crate::exposition;
use crate::snapshot::SnapshotReader;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Body of `GET /`.
pub const BANNER: &str = "OBD exporter!\n";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    snapshots: SnapshotReader,
    acquisition: AcquisitionHandle,
}

impl AppState {
    pub fn new(snapshots: SnapshotReader, acquisition: AcquisitionHandle) -> Self {
        Self {
            snapshots,
            acquisition,
        }
    }
}

/// Build the router with all exporter routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/exporter/metrics", get(exporter_metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
///
/// # Arguments
///
/// * `listen_address` - Address to bind to (e.g., "0.0.0.0:8080")
/// * `state` - Snapshot reader and acquisition handle
///
/// # Examples
///
/// ```no_run
/// use obd_exporter::acquisition::AcquisitionHandle;
/// use obd_exporter::server::{start_server, AppState};
/// use obd_exporter::snapshot::SnapshotStore;
///
/// #[tokio::main]
/// async fn main() {
///     let store = SnapshotStore::new();
///     let handle = AcquisitionHandle::new().unwrap();
///     let state = AppState::new(store.reader(), handle);
///     start_server("0.0.0.0:8080", state).await.unwrap();
/// }
/// ```
pub async fn start_server(listen_address: &str, state: AppState) -> Result<()> {
    info!("Starting HTTP server on {}", listen_address);

    let listener = TcpListener::bind(listen_address).await?;
    serve(listener, state).await
}

/// Serve on an already bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    axum::serve(listener, router(state))
        .await
        .map_err(|e| ObdError::Server(e.to_string()))
}

/// Handler for root endpoint.
async fn root_handler() -> &'static str {
    BANNER
}

/// Handler for /metrics endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let snapshot = state.snapshots.read();
    debug!("Serving {} readings", snapshot.len());

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, exposition::CONTENT_TYPE)],
        exposition::render(&snapshot),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    acquisition: AcquisitionState,
    readings: usize,
}

/// Handler for /health endpoint.
async fn health_handler(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        acquisition: state.acquisition.state(),
        readings: state.snapshots.read().len(),
    })
}

/// Handler for /exporter/metrics endpoint.
async fn exporter_metrics_handler(State(state): State<AppState>) -> Response {
    match state.acquisition.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, exposition::CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!("Failed to encode exporter metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode exporter metrics: {}", e),
            )
                .into_response()
        }
    }
}
