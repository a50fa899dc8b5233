//! Operator status endpoint.
//!
//! A small HTTP server exposing the delivery queue's health and counters:
//! `GET /healthz` and `GET /v1/status`.

pub mod config;

// Re-export commonly used items
pub use config::StatusConfig;

use crate::delivery::{DeliveryQueue, QueueStatus};
use crate::error::{AirqError, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

async fn healthz() -> &'static str {
    "ok"
}

async fn get_status(
    State(queue): State<DeliveryQueue>,
) -> std::result::Result<Json<QueueStatus>, (StatusCode, String)> {
    let status = queue
        .status()
        .await
        .map_err(|err| (StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;
    Ok(Json(status))
}

/// Build the status router for a delivery queue.
pub fn create_app(queue: DeliveryQueue) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(queue)
}

/// Serve the status endpoint until the process exits.
pub async fn start_status_server(config: StatusConfig, queue: DeliveryQueue) -> Result<()> {
    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| AirqError::config_error(format!("Invalid status bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        AirqError::status_server_error(format!("Failed to bind to address: {}", e))
    })?;
    info!("Status endpoint available at http://{}/v1/status", addr);

    axum::serve(listener, create_app(queue))
        .await
        .map_err(|e| AirqError::status_server_error(format!("Server error: {}", e)))?;

    Ok(())
}
