//! Handlers for notification and archive inspection endpoints.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ApiError, ApiState};

fn default_limit() -> i64 {
    50
}

/// Paging parameters for listing endpoints.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Maximum number of entries to return, newest first.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// Retrieves recent notification intents, newest first.
pub async fn get_notifications(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let intents = state.store.intent_history(params.limit.clamp(1, 500)).await?;
    Ok((StatusCode::OK, Json(json!({ "notifications": intents }))))
}

/// Summary of an archived batch; the raw body stays out of listings.
#[derive(Debug, Serialize)]
pub struct ArchiveSummary {
    /// Archive identifier.
    pub archive_id: i64,
    /// Request identifier supplied by the sender.
    pub request_id: String,
    /// When the batch was received.
    pub received_at: chrono::DateTime<chrono::Utc>,
    /// When processing finished.
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Lifecycle status.
    pub status: crate::models::archive::ArchiveStatus,
    /// Error detail for failed or rejected entries.
    pub error: Option<String>,
}

/// Retrieves recent archived batches, newest first.
pub async fn get_archive(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state.store.list_archived_batches(params.limit.clamp(1, 500)).await?;
    let summaries: Vec<ArchiveSummary> = entries
        .into_iter()
        .map(|e| ArchiveSummary {
            archive_id: e.archive_id,
            request_id: e.request_id,
            received_at: e.received_at,
            processed_at: e.processed_at,
            status: e.status,
            error: e.error,
        })
        .collect();
    Ok((StatusCode::OK, Json(json!({ "archive": summaries }))))
}
