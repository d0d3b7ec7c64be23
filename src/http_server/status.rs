//! Represents the `/status` endpoint handler and response structure.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;

use super::{ApiError, ApiState};
use crate::models::intent::IntentStatus;

/// Represents the response from the `/status` endpoint.
#[derive(Debug, Serialize, Clone)]
pub struct StatusResponse {
    /// The version of the application.
    pub version: String,
    /// The uptime of the application in seconds.
    pub uptime_secs: u64,
    /// Height of the highest live block, absent before the first apply.
    pub latest_height: Option<u64>,
    /// Number of notification intents awaiting delivery.
    pub pending_notifications: i64,
}

/// Retrieves application status and pipeline depth.
pub async fn status(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let latest_height = state.store.latest_height().await?;
    let pending_notifications = state.store.count_intents(IntentStatus::Pending).await?;
    let response = StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        latest_height,
        pending_notifications,
    };
    Ok((StatusCode::OK, Json(response)))
}
