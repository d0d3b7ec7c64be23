//! Defines the custom `ApiError` type for the HTTP server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::{engine::ingest::IngestError, persistence::error::PersistenceError};

/// A custom error type for the API that can be converted into an HTTP response.
pub enum ApiError {
    /// The request body could not be decoded.
    BadRequest(String),

    /// Represents a resource that could not be found.
    NotFound(String),

    /// Represents a conflict, e.g. a replay of a non-replayable entry.
    Conflict(String),

    /// Represents a generic internal server error.
    InternalServerError(String),
}

/// Converts a `PersistenceError` into an `ApiError`.
///
/// This allows for the convenient use of the `?` operator in handlers
/// on functions that return `Result<_, PersistenceError>`.
impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            _ => ApiError::InternalServerError(err.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Rejected(detail) => ApiError::BadRequest(detail),
            IngestError::ArchiveNotFound(id) =>
                ApiError::NotFound(format!("Archive entry {id} not found")),
            IngestError::NotReplayable { .. } => ApiError::Conflict(err.to_string()),
            IngestError::Persistence(e) => e.into(),
        }
    }
}

/// Implements the conversion from `ApiError` into an `axum` response.
///
/// This is the central point for mapping internal application errors to
/// user-facing HTTP responses.
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) =>
                (StatusCode::BAD_REQUEST, json!({ "error": message })),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, json!({ "error": message })),
            ApiError::InternalServerError(err) => {
                tracing::error!("Internal server error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "An internal server error occurred" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
