//! End-to-end tests for the ingest-to-notification pipeline.

use std::sync::Arc;

use vigil::{
    config::DispatcherConfig,
    dispatch::{
        DispatchSignal, Dispatcher,
        channel::ChannelRegistry,
        webhook::WebhookAdapter,
    },
    engine::{ingest::IngestService, matcher::MatchEngine, rule_index::RuleIndexService},
    models::{archive::ArchiveStatus, intent::IntentStatus, rule::ChannelKind},
    persistence::sqlite::SqliteStore,
    test_helpers::{BlockBuilder, RuleBuilder, TransactionBuilder, apply_batch, rollback_batch, setup_store},
};

async fn ingest_service(store: Arc<SqliteStore>) -> Arc<IngestService> {
    let rules = Arc::new(RuleIndexService::new(store.clone()).await.unwrap());
    let (signal, _wake) = DispatchSignal::channel();
    Arc::new(IngestService::new(store, MatchEngine::new(rules), signal))
}

fn webhook_dispatcher(store: Arc<SqliteStore>, secret: Option<&str>) -> Dispatcher {
    let client =
        Arc::new(reqwest_middleware::ClientBuilder::new(reqwest::Client::new()).build());
    let mut channels = ChannelRegistry::new();
    channels.register(Arc::new(WebhookAdapter::new(client, secret.map(str::to_string))));
    Dispatcher::new(store, channels, DispatcherConfig::default())
}

#[tokio::test]
async fn test_apply_match_deliver() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "rule_name": "large usdc transfers",
            "transaction_hash": "0xt1",
            "severity": "warning",
        })))
        .with_status(200)
        .create_async()
        .await;

    let store = Arc::new(setup_store().await);
    store
        .insert_rule(
            &RuleBuilder::token_transfer("usdc", Some("1000"))
                .name("large usdc transfers")
                .severity(vigil::models::rule::Severity::Warning)
                .channel(ChannelKind::Webhook, &server.url())
                .build(),
        )
        .await
        .unwrap();

    let ingest = ingest_service(store.clone()).await;
    let report = ingest
        .ingest(&apply_batch(
            BlockBuilder::new("0xb1")
                .height(100)
                .transaction(
                    TransactionBuilder::new("0xt1").transfer_event("usdc", "2500").build(),
                )
                .build(),
        ))
        .await
        .unwrap();
    assert_eq!(report.applied, 1);

    webhook_dispatcher(store.clone(), None).drain().await.unwrap();

    mock.assert();
    assert_eq!(store.count_intents(IntentStatus::Sent).await.unwrap(), 1);
}

#[tokio::test]
async fn test_redelivered_batch_converges_to_single_notification() {
    let store = Arc::new(setup_store().await);
    store.insert_rule(&RuleBuilder::contract_call("0xpool", None).build()).await.unwrap();
    let ingest = ingest_service(store.clone()).await;

    let body = serde_json::to_vec(&apply_batch(
        BlockBuilder::new("0xb1")
            .transaction(TransactionBuilder::new("0xt1").call("0xpool", "swap").build())
            .build(),
    ))
    .unwrap();

    // Same payload delivered twice under different request ids, as an
    // at-least-once upstream would.
    ingest.ingest_raw("req-1", None, &body).await.unwrap();
    let (_, second) = ingest.ingest_raw("req-2", None, &body).await.unwrap();

    assert_eq!(second.applied, 0);
    assert_eq!(store.get_block_transactions("0xb1").await.unwrap().len(), 1);
    assert_eq!(store.count_intents(IntentStatus::Pending).await.unwrap(), 1);
}

#[tokio::test]
async fn test_rollback_invalidates_then_reapply_does_not_renotify() {
    let store = Arc::new(setup_store().await);
    store.insert_rule(&RuleBuilder::contract_call("0xpool", None).build()).await.unwrap();
    let ingest = ingest_service(store.clone()).await;

    let block = BlockBuilder::new("0xb1")
        .height(7)
        .transaction(TransactionBuilder::new("0xt1").call("0xpool", "swap").build())
        .build();
    ingest.ingest(&apply_batch(block.clone())).await.unwrap();

    // Reorg: the block goes away before delivery.
    let report = ingest.ingest(&rollback_batch(&["0xb1"])).await.unwrap();
    assert_eq!(report.rolled_back, 1);
    let intents = store.intents_for_transaction("0xt1").await.unwrap();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].status, IntentStatus::Invalidated);
    assert_eq!(ingest.latest_height().await.unwrap(), None);

    // The block becomes canonical again: state is revived but the
    // invalidated intent stays terminal and no duplicate is created.
    let report = ingest.ingest(&apply_batch(block)).await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(ingest.latest_height().await.unwrap(), Some(7));
    let intents = store.intents_for_transaction("0xt1").await.unwrap();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].status, IntentStatus::Invalidated);
}

#[tokio::test]
async fn test_rollback_does_not_touch_delivered_notifications() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/").with_status(200).create_async().await;

    let store = Arc::new(setup_store().await);
    store
        .insert_rule(
            &RuleBuilder::contract_call("0xpool", None)
                .channel(ChannelKind::Webhook, &server.url())
                .build(),
        )
        .await
        .unwrap();
    let ingest = ingest_service(store.clone()).await;

    ingest
        .ingest(&apply_batch(
            BlockBuilder::new("0xb1")
                .transaction(TransactionBuilder::new("0xt1").call("0xpool", "swap").build())
                .build(),
        ))
        .await
        .unwrap();
    webhook_dispatcher(store.clone(), None).drain().await.unwrap();
    assert_eq!(store.count_intents(IntentStatus::Sent).await.unwrap(), 1);

    ingest.ingest(&rollback_batch(&["0xb1"])).await.unwrap();

    // Sent is terminal; the rollback cannot recall a delivered notification.
    assert_eq!(store.count_intents(IntentStatus::Sent).await.unwrap(), 1);
    assert_eq!(store.count_intents(IntentStatus::Invalidated).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_batch_is_replayable_from_archive() {
    let store = Arc::new(setup_store().await);
    store.insert_rule(&RuleBuilder::contract_call("0xpool", None).build()).await.unwrap();
    let ingest = ingest_service(store.clone()).await;

    let body = serde_json::to_vec(&apply_batch(
        BlockBuilder::new("0xb1")
            .transaction(TransactionBuilder::new("0xt1").call("0xpool", "swap").build())
            .build(),
    ))
    .unwrap();
    let (archive_id, _) = ingest.ingest_raw("req-1", None, &body).await.unwrap();

    // Simulate a mid-processing failure recorded against the archive entry.
    store.finalize_archive(archive_id, ArchiveStatus::Failed, Some("io error")).await.unwrap();

    ingest.replay(archive_id).await.unwrap();

    let entry = store.get_archived_batch(archive_id).await.unwrap().unwrap();
    assert_eq!(entry.status, ArchiveStatus::Processed);
    // The replayed work is absorbed by the idempotent layers.
    assert_eq!(store.get_block_transactions("0xb1").await.unwrap().len(), 1);
    assert_eq!(store.count_intents(IntentStatus::Pending).await.unwrap(), 1);
}

#[tokio::test]
async fn test_rule_deactivation_takes_effect_after_rebuild() {
    let store = Arc::new(setup_store().await);
    let rule_id =
        store.insert_rule(&RuleBuilder::contract_call("0xpool", None).build()).await.unwrap();
    let rules = Arc::new(RuleIndexService::new(store.clone()).await.unwrap());
    let (signal, _wake) = DispatchSignal::channel();
    let ingest = IngestService::new(store.clone(), MatchEngine::new(rules.clone()), signal);

    store.set_rule_active(rule_id, false).await.unwrap();
    rules.rebuild().await.unwrap();

    ingest
        .ingest(&apply_batch(
            BlockBuilder::new("0xb1")
                .transaction(TransactionBuilder::new("0xt1").call("0xpool", "swap").build())
                .build(),
        ))
        .await
        .unwrap();

    assert_eq!(store.count_intents(IntentStatus::Pending).await.unwrap(), 0);
}
