//! Raw batch archive rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle of an archived batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ArchiveStatus {
    /// Archived; processing not yet finished.
    Pending,
    /// Applied (or rolled back) successfully.
    Processed,
    /// Downstream failure; eligible for operator-triggered replay.
    Failed,
    /// Malformed payload; never retried.
    Rejected,
}

impl std::fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveStatus::Pending => write!(f, "pending"),
            ArchiveStatus::Processed => write!(f, "processed"),
            ArchiveStatus::Failed => write!(f, "failed"),
            ArchiveStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A write-once archive entry for an inbound batch. Recorded before parsing
/// is attempted, so a mid-processing crash leaves a replayable record.
#[derive(Debug, Clone, FromRow)]
pub struct ArchivedBatch {
    /// Archive identifier.
    pub archive_id: i64,

    /// Request identifier supplied by the transport edge.
    pub request_id: String,

    /// When the batch was received.
    pub received_at: DateTime<Utc>,

    /// When processing finished.
    pub processed_at: Option<DateTime<Utc>>,

    /// Raw request headers, as JSON.
    pub headers: Option<String>,

    /// Raw request body.
    pub body: Vec<u8>,

    /// Lifecycle status.
    pub status: ArchiveStatus,

    /// Error detail for failed or rejected entries.
    pub error: Option<String>,
}
