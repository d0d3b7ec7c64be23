//! The durable notification outbox.
//!
//! Intent creation runs inside the ingest unit of work; everything the
//! dispatcher touches afterwards goes through the pool. A uniqueness
//! violation on insert means "already notified for this occurrence" and is
//! reported as `false`, never as an error.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::{error::PersistenceError, sqlite::SqliteStore};
use crate::models::{
    intent::{DispatchableIntent, IntentStatus, NotificationIntent},
    rule::ChannelKind,
};

/// Inserts a notification intent keyed by (rule, transaction, event,
/// channel). Returns whether a row was created.
pub async fn insert_intent(
    conn: &mut SqliteConnection,
    rule_id: i64,
    transaction_hash: &str,
    event_ordinal: Option<i64>,
    channel: ChannelKind,
    destination: &str,
    now: DateTime<Utc>,
) -> Result<bool, PersistenceError> {
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO notification_intents
             (rule_id, transaction_hash, event_ordinal, channel, destination,
              status, created_at)
         VALUES (?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(rule_id)
    .bind(transaction_hash)
    .bind(event_ordinal)
    .bind(channel)
    .bind(destination)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(inserted == 1)
}

/// Bulk-invalidates every pending intent whose triggering transaction belongs
/// to the given block. One set-based statement, safe to re-run: an already
/// invalidated set yields zero affected rows. Sent, failed and invalidated
/// intents are terminal and left untouched.
pub async fn invalidate_for_block(
    conn: &mut SqliteConnection,
    block_hash: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<u64, PersistenceError> {
    let invalidated = sqlx::query(
        "UPDATE notification_intents
         SET status = 'invalidated', invalidation_reason = ?, invalidated_at = ?
         WHERE status = 'pending'
           AND transaction_hash IN (
               SELECT t.hash FROM transactions t
               JOIN blocks b ON b.block_id = t.block_id
               WHERE b.hash = ?)",
    )
    .bind(reason)
    .bind(now)
    .bind(block_hash)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(invalidated)
}

impl SqliteStore {
    /// Fetches committed pending intents whose next attempt is due, joined
    /// with the rule fields needed to build a delivery payload.
    pub async fn fetch_dispatchable(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<DispatchableIntent>, PersistenceError> {
        let intents = sqlx::query_as::<_, DispatchableIntent>(
            "SELECT i.intent_id, i.rule_id, i.transaction_hash, i.event_ordinal,
                    i.channel, i.destination, i.attempts, i.created_at,
                    r.name AS rule_name, r.severity
             FROM notification_intents i
             JOIN alert_rules r ON r.rule_id = i.rule_id
             WHERE i.status = 'pending'
               AND (i.next_attempt_at IS NULL OR i.next_attempt_at <= ?)
             ORDER BY i.intent_id
             LIMIT ?",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(intents)
    }

    /// Marks a delivered intent as sent. A no-op if the intent reached a
    /// terminal status in the meantime.
    pub async fn mark_intent_sent(&self, intent_id: i64) -> Result<(), PersistenceError> {
        sqlx::query(
            "UPDATE notification_intents
             SET status = 'sent', attempts = attempts + 1, last_error = NULL
             WHERE intent_id = ? AND status = 'pending'",
        )
        .bind(intent_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Records a failed attempt and schedules the next one.
    pub async fn record_intent_failure(
        &self,
        intent_id: i64,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            "UPDATE notification_intents
             SET attempts = attempts + 1, last_error = ?, next_attempt_at = ?
             WHERE intent_id = ? AND status = 'pending'",
        )
        .bind(error)
        .bind(next_attempt_at)
        .bind(intent_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Marks an intent terminally failed after its retry budget is spent.
    pub async fn mark_intent_dead(
        &self,
        intent_id: i64,
        error: &str,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            "UPDATE notification_intents
             SET status = 'failed', attempts = attempts + 1, last_error = ?
             WHERE intent_id = ? AND status = 'pending'",
        )
        .bind(error)
        .bind(intent_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Returns the most recent intents, newest first.
    pub async fn intent_history(
        &self,
        limit: i64,
    ) -> Result<Vec<NotificationIntent>, PersistenceError> {
        let intents = sqlx::query_as::<_, NotificationIntent>(
            "SELECT * FROM notification_intents ORDER BY intent_id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(intents)
    }

    /// Returns every intent triggered by a transaction, oldest first.
    pub async fn intents_for_transaction(
        &self,
        transaction_hash: &str,
    ) -> Result<Vec<NotificationIntent>, PersistenceError> {
        let intents = sqlx::query_as::<_, NotificationIntent>(
            "SELECT * FROM notification_intents WHERE transaction_hash = ? ORDER BY intent_id",
        )
        .bind(transaction_hash)
        .fetch_all(self.pool())
        .await?;
        Ok(intents)
    }

    /// Counts intents in a given status.
    pub async fn count_intents(&self, status: IntentStatus) -> Result<i64, PersistenceError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notification_intents WHERE status = ?")
                .bind(status)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }
}
