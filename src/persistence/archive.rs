//! Write-once archive of inbound batches.

use chrono::Utc;

use super::{error::PersistenceError, sqlite::SqliteStore};
use crate::models::archive::{ArchiveStatus, ArchivedBatch};

impl SqliteStore {
    /// Archives a raw inbound batch with status `pending` before any parsing
    /// is attempted. A redelivered request id returns the existing entry's
    /// id with `fresh = false` instead of erroring.
    pub async fn archive_batch(
        &self,
        request_id: &str,
        headers: Option<&str>,
        body: &[u8],
    ) -> Result<(i64, bool), PersistenceError> {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO archived_batches (request_id, received_at, headers, body)
             VALUES (?, ?, ?, ?)",
        )
        .bind(request_id)
        .bind(Utc::now())
        .bind(headers)
        .bind(body)
        .execute(self.pool())
        .await?
        .rows_affected();

        let archive_id: i64 =
            sqlx::query_scalar("SELECT archive_id FROM archived_batches WHERE request_id = ?")
                .bind(request_id)
                .fetch_one(self.pool())
                .await?;

        Ok((archive_id, inserted == 1))
    }

    /// Finalizes an archive entry with its processing outcome.
    pub async fn finalize_archive(
        &self,
        archive_id: i64,
        status: ArchiveStatus,
        error: Option<&str>,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            "UPDATE archived_batches SET status = ?, processed_at = ?, error = ?
             WHERE archive_id = ?",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(error)
        .bind(archive_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Fetches an archive entry by id.
    pub async fn get_archived_batch(
        &self,
        archive_id: i64,
    ) -> Result<Option<ArchivedBatch>, PersistenceError> {
        let entry = sqlx::query_as::<_, ArchivedBatch>(
            "SELECT * FROM archived_batches WHERE archive_id = ?",
        )
        .bind(archive_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(entry)
    }

    /// Returns the most recent archive entries, newest first.
    pub async fn list_archived_batches(
        &self,
        limit: i64,
    ) -> Result<Vec<ArchivedBatch>, PersistenceError> {
        let entries = sqlx::query_as::<_, ArchivedBatch>(
            "SELECT * FROM archived_batches ORDER BY archive_id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(entries)
    }
}
