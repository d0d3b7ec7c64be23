//! The notification dispatcher.
//!
//! Consumes committed pending intents from the outbox and drives them to a
//! terminal status. Wakes on commit signals from ingest and on a fallback
//! polling interval that picks up scheduled retries.

pub mod channel;
pub mod email;
pub mod error;
pub mod payload;
pub mod webhook;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use self::{channel::ChannelRegistry, error::DispatchError, payload::NotificationPayload};
use crate::{
    config::DispatcherConfig,
    models::intent::DispatchableIntent,
    persistence::{error::PersistenceError, sqlite::SqliteStore},
};

/// Commit-side handle for waking the dispatcher. Cheap to clone; a full
/// buffer means a wakeup is already queued, so dropped sends are harmless.
#[derive(Clone)]
pub struct DispatchSignal(mpsc::Sender<()>);

impl DispatchSignal {
    /// Creates a signal and the receiving end the dispatcher loop consumes.
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self(tx), rx)
    }

    /// Wakes the dispatcher. Never blocks.
    pub fn notify(&self) {
        let _ = self.0.try_send(());
    }
}

/// Delivers pending intents through registered channel adapters.
pub struct Dispatcher {
    store: Arc<SqliteStore>,
    channels: ChannelRegistry,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Creates a dispatcher.
    pub fn new(store: Arc<SqliteStore>, channels: ChannelRegistry, config: DispatcherConfig) -> Self {
        Self { store, channels, config }
    }

    /// Runs the dispatch loop until every `DispatchSignal` is dropped.
    pub async fn run(&self, mut wake: mpsc::Receiver<()>) {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("Dispatcher started.");

        loop {
            tokio::select! {
                received = wake.recv() => {
                    if received.is_none() {
                        break;
                    }
                }
                _ = poll.tick() => {}
            }
            if let Err(e) = self.drain().await {
                tracing::error!(error = %e, "Dispatch cycle failed.");
            }
        }
        tracing::info!("Dispatcher stopped.");
    }

    /// Delivers every currently due intent. Failed intents leave each pass
    /// with a future `next_attempt_at` or a terminal status, so the loop
    /// always terminates.
    pub async fn drain(&self) -> Result<(), PersistenceError> {
        loop {
            let due = self.store.fetch_dispatchable(Utc::now(), self.config.batch_size).await?;
            if due.is_empty() {
                return Ok(());
            }
            for intent in due {
                self.deliver(intent).await?;
            }
        }
    }

    /// Drives one intent through a single delivery attempt.
    async fn deliver(&self, intent: DispatchableIntent) -> Result<(), PersistenceError> {
        let Some(adapter) = self.channels.get(intent.channel) else {
            let error = DispatchError::UnknownChannel(intent.channel);
            tracing::error!(intent_id = intent.intent_id, channel = %intent.channel,
                "No adapter for channel, marking intent failed.");
            return self.store.mark_intent_dead(intent.intent_id, &error.to_string()).await;
        };

        let payload = NotificationPayload::from_intent(&intent);
        let result = match tokio::time::timeout(
            self.config.delivery_timeout,
            adapter.send(&payload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(self.config.delivery_timeout)),
        };

        match result {
            Ok(()) => {
                tracing::info!(intent_id = intent.intent_id, rule = %intent.rule_name,
                    channel = %intent.channel, "Notification delivered.");
                self.store.mark_intent_sent(intent.intent_id).await
            }
            Err(e) => {
                let attempts = intent.attempts + 1;
                if attempts >= self.config.max_attempts {
                    tracing::warn!(intent_id = intent.intent_id, attempts, error = %e,
                        "Retry budget spent, marking intent failed.");
                    self.store.mark_intent_dead(intent.intent_id, &e.to_string()).await
                } else {
                    let next_attempt_at = Utc::now()
                        + chrono::Duration::from_std(self.config.retry_delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(30));
                    tracing::warn!(intent_id = intent.intent_id, attempts, error = %e,
                        "Delivery attempt failed, retry scheduled.");
                    self.store
                        .record_intent_failure(intent.intent_id, &e.to_string(), next_attempt_at)
                        .await
                }
            }
        }
    }
}
