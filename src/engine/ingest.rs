//! The ingest unit of work.
//!
//! Each block apply or rollback runs under a per-hash lock and inside a
//! single database transaction: chain-state writes, rule matching and outbox
//! rows commit together or not at all. The dispatcher is only signalled
//! after the commit, so it can never observe an intent whose triggering
//! state was rolled back by an abort.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use super::matcher::MatchEngine;
use crate::{
    dispatch::DispatchSignal,
    models::{
        archive::ArchiveStatus,
        batch::{BlockData, IngestBatch, IngestReport},
    },
    persistence::{
        chain::{apply_block, rollback_block},
        error::PersistenceError,
        outbox::invalidate_for_block,
        sqlite::SqliteStore,
    },
};

/// Errors surfaced by the ingest surface.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The raw payload could not be decoded into a batch.
    #[error("malformed batch: {0}")]
    Rejected(String),

    /// No archive entry with this id exists.
    #[error("archive entry {0} not found")]
    ArchiveNotFound(i64),

    /// Replay was requested for an entry that is not in the failed state.
    #[error("archive entry {archive_id} is {status}, only failed entries can be replayed")]
    NotReplayable {
        /// The entry that was asked to replay.
        archive_id: i64,
        /// Its current status.
        status: ArchiveStatus,
    },

    /// A storage operation failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Drives batches through archive, apply/rollback, matching and outbox
/// creation.
pub struct IngestService {
    store: Arc<SqliteStore>,
    matcher: MatchEngine,
    dispatch: DispatchSignal,

    /// Per-block-hash locks serialising apply against rollback of the same
    /// block. Different blocks proceed concurrently.
    block_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IngestService {
    /// Creates the service.
    pub fn new(store: Arc<SqliteStore>, matcher: MatchEngine, dispatch: DispatchSignal) -> Self {
        Self { store, matcher, dispatch, block_locks: DashMap::new() }
    }

    /// Ingests a decoded batch. Blocks within a batch are processed in
    /// delivery order, each in its own unit of work.
    #[tracing::instrument(skip_all)]
    pub async fn ingest(&self, batch: &IngestBatch) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();
        match batch {
            IngestBatch::Apply { blocks } => {
                for block in blocks {
                    if self.apply_one(block).await? {
                        report.applied += 1;
                    }
                }
            }
            IngestBatch::Rollback { block_hashes } => {
                for hash in block_hashes {
                    if self.rollback_one(hash).await? {
                        report.rolled_back += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    /// Archives a raw inbound payload, then decodes and ingests it. The
    /// archive row is finalized with the outcome either way. Redelivery of a
    /// known request id reprocesses against the idempotent layers below.
    pub async fn ingest_raw(
        &self,
        request_id: &str,
        headers: Option<&str>,
        body: &[u8],
    ) -> Result<(i64, IngestReport), IngestError> {
        let (archive_id, fresh) = self.store.archive_batch(request_id, headers, body).await?;
        if !fresh {
            tracing::info!(request_id, archive_id, "Redelivered request id, reprocessing.");
        }
        let report = self.process_archived(archive_id, body).await?;
        Ok((archive_id, report))
    }

    /// Replays a previously failed archive entry from its stored body.
    pub async fn replay(&self, archive_id: i64) -> Result<IngestReport, IngestError> {
        let entry = self
            .store
            .get_archived_batch(archive_id)
            .await?
            .ok_or(IngestError::ArchiveNotFound(archive_id))?;
        if entry.status != ArchiveStatus::Failed {
            return Err(IngestError::NotReplayable { archive_id, status: entry.status });
        }
        tracing::info!(archive_id, request_id = %entry.request_id, "Replaying archived batch.");
        self.process_archived(archive_id, &entry.body).await
    }

    /// Current canonical chain height, if any block is live.
    pub async fn latest_height(&self) -> Result<Option<u64>, PersistenceError> {
        self.store.latest_height().await
    }

    async fn process_archived(
        &self,
        archive_id: i64,
        body: &[u8],
    ) -> Result<IngestReport, IngestError> {
        let batch: IngestBatch = match serde_json::from_slice(body) {
            Ok(batch) => batch,
            Err(e) => {
                self.store
                    .finalize_archive(archive_id, ArchiveStatus::Rejected, Some(&e.to_string()))
                    .await?;
                tracing::warn!(archive_id, error = %e, "Rejected malformed batch.");
                return Err(IngestError::Rejected(e.to_string()));
            }
        };

        match self.ingest(&batch).await {
            Ok(report) => {
                self.store.finalize_archive(archive_id, ArchiveStatus::Processed, None).await?;
                Ok(report)
            }
            Err(e) => {
                self.store
                    .finalize_archive(archive_id, ArchiveStatus::Failed, Some(&e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    /// Applies one block in one database transaction, matching rules over
    /// freshly inserted transactions. Returns whether state changed.
    async fn apply_one(&self, block: &BlockData) -> Result<bool, IngestError> {
        let lock = self.block_lock(&block.hash);
        let _guard = lock.lock().await;
        let now = Utc::now();

        let mut db_tx = self.store.pool().begin().await.map_err(PersistenceError::from)?;
        let outcome = apply_block(&mut db_tx, block).await?;
        let mut intents = 0;
        for applied in &outcome.fresh_transactions {
            intents += self.matcher.evaluate_transaction(&mut db_tx, &applied.data, now).await?;
        }
        db_tx.commit().await.map_err(PersistenceError::from)?;

        if outcome.applied {
            tracing::info!(block_hash = %block.hash, height = block.height,
                revived = outcome.revived, intents, "Applied block.");
        }
        if intents > 0 {
            self.dispatch.notify();
        }
        Ok(outcome.applied)
    }

    /// Tombstones one block and invalidates its pending intents in the same
    /// database transaction. Returns whether state changed.
    async fn rollback_one(&self, hash: &str) -> Result<bool, IngestError> {
        let lock = self.block_lock(hash);
        let _guard = lock.lock().await;
        let now = Utc::now();

        let mut db_tx = self.store.pool().begin().await.map_err(PersistenceError::from)?;
        let tombstoned = rollback_block(&mut db_tx, hash, now).await?;
        let invalidated = if tombstoned {
            invalidate_for_block(&mut db_tx, hash, "block rolled back", now).await?
        } else {
            0
        };
        db_tx.commit().await.map_err(PersistenceError::from)?;

        if tombstoned {
            tracing::info!(block_hash = %hash, invalidated, "Rolled back block.");
        }
        Ok(tombstoned)
    }

    fn block_lock(&self, hash: &str) -> Arc<Mutex<()>> {
        self.block_locks.entry(hash.to_string()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::rule_index::RuleIndexService,
        models::intent::IntentStatus,
        test_helpers::{BlockBuilder, RuleBuilder, TransactionBuilder, setup_store},
    };

    async fn service(store: Arc<SqliteStore>) -> IngestService {
        let rules = Arc::new(RuleIndexService::new(store.clone()).await.unwrap());
        let (signal, _rx) = DispatchSignal::channel();
        IngestService::new(store, MatchEngine::new(rules), signal)
    }

    fn swap_batch(block: &str, tx: &str) -> IngestBatch {
        IngestBatch::Apply {
            blocks: vec![
                BlockBuilder::new(block)
                    .height(100)
                    .transaction(TransactionBuilder::new(tx).call("0xpool", "swap").build())
                    .build(),
            ],
        }
    }

    #[tokio::test]
    async fn test_apply_batch_matches_and_persists() {
        let store = Arc::new(setup_store().await);
        store.insert_rule(&RuleBuilder::contract_call("0xpool", Some("swap")).build()).await.unwrap();
        let service = service(store.clone()).await;

        let report = service.ingest(&swap_batch("0xb1", "0xt1")).await.unwrap();
        assert_eq!(report, IngestReport { applied: 1, rolled_back: 0 });

        assert_eq!(service.latest_height().await.unwrap(), Some(100));
        assert_eq!(store.count_intents(IntentStatus::Pending).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_apply_batch_twice_converges() {
        let store = Arc::new(setup_store().await);
        store.insert_rule(&RuleBuilder::contract_call("0xpool", None).build()).await.unwrap();
        let service = service(store.clone()).await;
        let batch = swap_batch("0xb1", "0xt1");

        service.ingest(&batch).await.unwrap();
        let second = service.ingest(&batch).await.unwrap();

        assert_eq!(second, IngestReport::default());
        assert_eq!(store.count_intents(IntentStatus::Pending).await.unwrap(), 1);
        assert_eq!(store.get_block_transactions("0xb1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_batch_invalidates_pending_intents() {
        let store = Arc::new(setup_store().await);
        store.insert_rule(&RuleBuilder::contract_call("0xpool", None).build()).await.unwrap();
        let service = service(store.clone()).await;
        service.ingest(&swap_batch("0xb1", "0xt1")).await.unwrap();

        let rollback = IngestBatch::Rollback { block_hashes: vec!["0xb1".into()] };
        let report = service.ingest(&rollback).await.unwrap();
        assert_eq!(report, IngestReport { applied: 0, rolled_back: 1 });

        assert!(store.get_block("0xb1").await.unwrap().unwrap().deleted);
        let intents = store.intents_for_transaction("0xt1").await.unwrap();
        assert_eq!(intents[0].status, IntentStatus::Invalidated);
        assert_eq!(service.latest_height().await.unwrap(), None);

        // Rolling back an unknown block is absorbed.
        let unknown = IngestBatch::Rollback { block_hashes: vec!["0xmissing".into()] };
        assert_eq!(service.ingest(&unknown).await.unwrap(), IngestReport::default());
    }

    #[tokio::test]
    async fn test_ingest_raw_archives_then_processes() {
        let store = Arc::new(setup_store().await);
        let service = service(store.clone()).await;
        let body = serde_json::to_vec(&swap_batch("0xb1", "0xt1")).unwrap();

        let (archive_id, report) = service.ingest_raw("req-1", None, &body).await.unwrap();
        assert_eq!(report.applied, 1);
        let entry = store.get_archived_batch(archive_id).await.unwrap().unwrap();
        assert_eq!(entry.status, ArchiveStatus::Processed);

        // Redelivery reuses the archive row and converges.
        let (again_id, again) = service.ingest_raw("req-1", None, &body).await.unwrap();
        assert_eq!(again_id, archive_id);
        assert_eq!(again, IngestReport::default());
    }

    #[tokio::test]
    async fn test_ingest_raw_rejects_malformed_body() {
        let store = Arc::new(setup_store().await);
        let service = service(store.clone()).await;

        let err = service.ingest_raw("req-1", None, b"{ not json").await.unwrap_err();
        assert!(matches!(err, IngestError::Rejected(_)));

        let entries = store.list_archived_batches(1).await.unwrap();
        assert_eq!(entries[0].status, ArchiveStatus::Rejected);
        assert!(entries[0].error.is_some());
    }

    #[tokio::test]
    async fn test_replay_is_limited_to_failed_entries() {
        let store = Arc::new(setup_store().await);
        let service = service(store.clone()).await;

        assert!(matches!(
            service.replay(42).await.unwrap_err(),
            IngestError::ArchiveNotFound(42)
        ));

        let body = serde_json::to_vec(&swap_batch("0xb1", "0xt1")).unwrap();
        let (archive_id, _) = service.ingest_raw("req-1", None, &body).await.unwrap();
        assert!(matches!(
            service.replay(archive_id).await.unwrap_err(),
            IngestError::NotReplayable { status: ArchiveStatus::Processed, .. }
        ));

        // A failed entry replays from its archived body.
        store.finalize_archive(archive_id, ArchiveStatus::Failed, Some("boom")).await.unwrap();
        let report = service.replay(archive_id).await.unwrap();
        // The block is already applied, so the replay converges to a no-op.
        assert_eq!(report, IngestReport::default());
        let entry = store.get_archived_batch(archive_id).await.unwrap().unwrap();
        assert_eq!(entry.status, ArchiveStatus::Processed);
    }
}
