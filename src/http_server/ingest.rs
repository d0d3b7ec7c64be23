//! Handlers for the ingest and replay endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::json;

use super::{ApiError, ApiState};

/// Accepts a raw batch, archives it and processes it. The `X-Request-Id`
/// header is the redelivery key; one is generated when absent.
pub async fn ingest(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let headers_json = headers_to_json(&headers);
    let (archive_id, report) =
        state.ingest.ingest_raw(&request_id, Some(&headers_json), &body).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "archive_id": archive_id,
            "request_id": request_id,
            "applied": report.applied,
            "rolled_back": report.rolled_back,
        })),
    ))
}

/// Replays a previously failed archived batch.
pub async fn replay(
    State(state): State<ApiState>,
    Path(archive_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.ingest.replay(archive_id).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "archive_id": archive_id,
            "applied": report.applied,
            "rolled_back": report.rolled_back,
        })),
    ))
}

fn headers_to_json(headers: &HeaderMap) -> String {
    let map: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| (name.to_string(), serde_json::Value::from(v)))
        })
        .collect();
    serde_json::Value::Object(map).to_string()
}
