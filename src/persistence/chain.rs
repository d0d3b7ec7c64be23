//! Idempotent apply/rollback of chain state.
//!
//! The write paths take a `&mut SqliteConnection` so they can participate in
//! the caller's transaction: a block and its transactions/events persist
//! all-or-nothing, and the outbox rows created by matching commit in the same
//! unit of work. Business-key uniqueness (`INSERT OR IGNORE` + affected-row
//! counts) is the idempotency authority, not application-level pre-checks.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::{error::PersistenceError, sqlite::SqliteStore};
use crate::models::{
    batch::{BlockData, TransactionData},
    block::Block,
    event::EventRecord,
    transaction::TransactionRecord,
};

/// A transaction persisted for the first time by an apply, together with its
/// assigned row id. Matching runs only over these.
#[derive(Debug, Clone)]
pub struct AppliedTransaction {
    /// Row id assigned by the database.
    pub tx_id: i64,

    /// The decoded transaction as delivered.
    pub data: TransactionData,
}

/// Outcome of applying one block.
#[derive(Debug, Default)]
pub struct BlockApplyOutcome {
    /// Whether this apply changed state (fresh insert or revival).
    pub applied: bool,

    /// Whether a tombstoned block was revived instead of inserted.
    pub revived: bool,

    /// Transactions persisted for the first time by this apply.
    pub fresh_transactions: Vec<AppliedTransaction>,
}

/// Applies a block with its transactions and events. Calling this twice for
/// the same hash is safe: the repeat is a no-op, unless the existing block
/// was tombstoned, in which case it is revived with all its children.
pub async fn apply_block(
    conn: &mut SqliteConnection,
    block: &BlockData,
) -> Result<BlockApplyOutcome, PersistenceError> {
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO blocks (hash, parent_hash, height, timestamp, miner)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&block.hash)
    .bind(&block.parent_hash)
    .bind(block.height)
    .bind(block.timestamp)
    .bind(&block.miner)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if inserted == 0 {
        return revive_if_tombstoned(conn, &block.hash).await;
    }

    let block_id: i64 = sqlx::query_scalar("SELECT block_id FROM blocks WHERE hash = ?")
        .bind(&block.hash)
        .fetch_one(&mut *conn)
        .await?;

    let mut outcome = BlockApplyOutcome { applied: true, ..Default::default() };
    for tx in &block.transactions {
        if let Some(applied) = insert_transaction(conn, block_id, tx).await? {
            outcome.fresh_transactions.push(applied);
        }
    }
    Ok(outcome)
}

/// Inserts one transaction and its events; returns `None` when the hash was
/// already persisted (duplicate delivery).
async fn insert_transaction(
    conn: &mut SqliteConnection,
    block_id: i64,
    tx: &TransactionData,
) -> Result<Option<AppliedTransaction>, PersistenceError> {
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO transactions
             (hash, block_id, sender, success, ordinal, fee,
              contract_address, function_name, deployed_contract)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&tx.hash)
    .bind(block_id)
    .bind(&tx.sender)
    .bind(tx.success)
    .bind(tx.ordinal)
    .bind(&tx.fee)
    .bind(tx.call.as_ref().map(|c| c.contract.as_str()))
    .bind(tx.call.as_ref().map(|c| c.function.as_str()))
    .bind(tx.deployment.as_ref().map(|d| d.contract.as_str()))
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if inserted == 0 {
        tracing::debug!(tx_hash = %tx.hash, "Transaction already persisted, skipping.");
        return Ok(None);
    }

    let tx_id: i64 = sqlx::query_scalar("SELECT tx_id FROM transactions WHERE hash = ?")
        .bind(&tx.hash)
        .fetch_one(&mut *conn)
        .await?;

    for event in &tx.events {
        let payload = serde_json::to_string(&event.detail)?;
        sqlx::query(
            "INSERT OR IGNORE INTO chain_events
                 (tx_id, ordinal, kind, contract_address, asset_id, amount,
                  sender, recipient, payload)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tx_id)
        .bind(event.ordinal)
        .bind(event.detail.kind())
        .bind(&event.contract)
        .bind(event.detail.asset())
        .bind(event.detail.amount())
        .bind(event.detail.sender())
        .bind(event.detail.recipient())
        .bind(payload)
        .execute(&mut *conn)
        .await?;
    }

    Ok(Some(AppliedTransaction { tx_id, data: tx.clone() }))
}

/// Revives a tombstoned block and everything it owns. A re-apply of a live
/// block falls through here as a pure no-op.
async fn revive_if_tombstoned(
    conn: &mut SqliteConnection,
    hash: &str,
) -> Result<BlockApplyOutcome, PersistenceError> {
    let row: Option<(i64, bool)> =
        sqlx::query_as("SELECT block_id, deleted FROM blocks WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&mut *conn)
            .await?;

    let Some((block_id, deleted)) = row else {
        return Err(PersistenceError::NotFound(format!("block {hash}")));
    };
    if !deleted {
        tracing::debug!(block_hash = %hash, "Block already applied, skipping.");
        return Ok(BlockApplyOutcome::default());
    }

    sqlx::query("UPDATE blocks SET deleted = 0, deleted_at = NULL WHERE block_id = ?")
        .bind(block_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("UPDATE transactions SET deleted = 0, deleted_at = NULL WHERE block_id = ?")
        .bind(block_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "UPDATE chain_events SET deleted = 0, deleted_at = NULL
         WHERE tx_id IN (SELECT tx_id FROM transactions WHERE block_id = ?)",
    )
    .bind(block_id)
    .execute(&mut *conn)
    .await?;

    tracing::info!(block_hash = %hash, "Revived tombstoned block.");
    Ok(BlockApplyOutcome { applied: true, revived: true, fresh_transactions: Vec::new() })
}

/// Tombstones a block and cascades to every owned transaction and event.
/// Repeating the call on an already-tombstoned (or unknown) block is a no-op.
/// Returns whether this call tombstoned the block.
pub async fn rollback_block(
    conn: &mut SqliteConnection,
    hash: &str,
    now: DateTime<Utc>,
) -> Result<bool, PersistenceError> {
    let tombstoned = sqlx::query(
        "UPDATE blocks SET deleted = 1, deleted_at = ? WHERE hash = ? AND deleted = 0",
    )
    .bind(now)
    .bind(hash)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if tombstoned == 0 {
        tracing::debug!(block_hash = %hash, "Rollback is a no-op (unknown or already tombstoned).");
        return Ok(false);
    }

    let block_id: i64 = sqlx::query_scalar("SELECT block_id FROM blocks WHERE hash = ?")
        .bind(hash)
        .fetch_one(&mut *conn)
        .await?;

    sqlx::query("UPDATE transactions SET deleted = 1, deleted_at = ? WHERE block_id = ? AND deleted = 0")
        .bind(now)
        .bind(block_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "UPDATE chain_events SET deleted = 1, deleted_at = ?
         WHERE deleted = 0 AND tx_id IN (SELECT tx_id FROM transactions WHERE block_id = ?)",
    )
    .bind(now)
    .bind(block_id)
    .execute(&mut *conn)
    .await?;

    tracing::info!(block_hash = %hash, "Tombstoned block and its children.");
    Ok(true)
}

impl SqliteStore {
    /// Returns the height of the highest non-tombstoned block, if any.
    pub async fn latest_height(&self) -> Result<Option<u64>, PersistenceError> {
        let height: Option<i64> =
            sqlx::query_scalar("SELECT MAX(height) FROM blocks WHERE deleted = 0")
                .fetch_one(self.pool())
                .await?;
        Ok(height.map(|h| h as u64))
    }

    /// Fetches a block by hash, tombstoned or not.
    pub async fn get_block(&self, hash: &str) -> Result<Option<Block>, PersistenceError> {
        let block = sqlx::query_as::<_, Block>("SELECT * FROM blocks WHERE hash = ?")
            .bind(hash)
            .fetch_optional(self.pool())
            .await?;
        Ok(block)
    }

    /// Fetches all transactions owned by a block, in block order.
    pub async fn get_block_transactions(
        &self,
        block_hash: &str,
    ) -> Result<Vec<TransactionRecord>, PersistenceError> {
        let txs = sqlx::query_as::<_, TransactionRecord>(
            "SELECT t.* FROM transactions t
             JOIN blocks b ON b.block_id = t.block_id
             WHERE b.hash = ? ORDER BY t.ordinal",
        )
        .bind(block_hash)
        .fetch_all(self.pool())
        .await?;
        Ok(txs)
    }

    /// Fetches all events owned by a transaction, in emission order.
    pub async fn get_transaction_events(
        &self,
        tx_hash: &str,
    ) -> Result<Vec<EventRecord>, PersistenceError> {
        let events = sqlx::query_as::<_, EventRecord>(
            "SELECT e.* FROM chain_events e
             JOIN transactions t ON t.tx_id = e.tx_id
             WHERE t.hash = ? ORDER BY e.ordinal",
        )
        .bind(tx_hash)
        .fetch_all(self.pool())
        .await?;
        Ok(events)
    }
}
