//! Persisted transaction records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted transaction. Owned by a block through `block_id`; the
/// tombstone flag always mirrors the owning block's.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransactionRecord {
    /// Surrogate identifier assigned by the database.
    pub tx_id: i64,

    /// Transaction hash, unique across the table.
    pub hash: String,

    /// Identifier of the owning block.
    pub block_id: i64,

    /// Sender address.
    pub sender: String,

    /// Whether the transaction executed successfully.
    pub success: bool,

    /// Position of the transaction within its block.
    pub ordinal: i64,

    /// Fee paid, as a decimal string.
    pub fee: Option<String>,

    /// Called contract, when the transaction was a contract call.
    pub contract_address: Option<String>,

    /// Called function, when the transaction was a contract call.
    pub function_name: Option<String>,

    /// Contract created by the transaction, when it was a deployment.
    pub deployed_contract: Option<String>,

    /// Tombstone flag, mirroring the owning block.
    pub deleted: bool,

    /// When the transaction was tombstoned.
    pub deleted_at: Option<DateTime<Utc>>,
}
