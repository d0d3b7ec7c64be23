//! HTTP server module: the ingest edge and read-side inspection endpoints.

mod error;
mod ingest;
mod notifications;
mod status;

pub use error::ApiError;

use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::{
    Json, Router,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use crate::{config::ServerConfig, engine::ingest::IngestService, persistence::sqlite::SqliteStore};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    /// The ingest service driving batches through the pipeline.
    pub ingest: Arc<IngestService>,

    /// Store handle for the read-side endpoints.
    pub store: Arc<SqliteStore>,

    /// Process start time, for uptime reporting.
    pub started_at: Instant,
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Builds the API router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status::status))
        .route("/ingest", post(ingest::ingest))
        .route("/replay/{archive_id}", post(ingest::replay))
        .route("/notifications", get(notifications::get_notifications))
        .route("/archive", get(notifications::get_archive))
        .with_state(state)
}

/// Runs the HTTP server based on the provided server configuration.
pub async fn run_server(config: &ServerConfig, state: ApiState) {
    let addr: SocketAddr =
        config.listen_address.parse().expect("Invalid server.listen_address format");

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind address");
    tracing::info!(%addr, "API server listening.");

    axum::serve(listener, app.into_make_service()).await.expect("Server failed");
}
