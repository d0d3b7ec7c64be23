//! Persisted block records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted block. The hash is the business key; `deleted` marks the block
/// as rolled back without removing the row, so a later re-apply of the same
/// hash revives it instead of re-inserting.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Block {
    /// Surrogate identifier assigned by the database.
    pub block_id: i64,

    /// Block hash, unique across the table.
    pub hash: String,

    /// Hash of the parent block.
    pub parent_hash: String,

    /// Block height.
    pub height: i64,

    /// Block timestamp (seconds since the epoch, as delivered upstream).
    pub timestamp: i64,

    /// Address that produced the block, when known.
    pub miner: Option<String>,

    /// Tombstone flag set by rollback.
    pub deleted: bool,

    /// When the block was tombstoned.
    pub deleted_at: Option<DateTime<Utc>>,
}
