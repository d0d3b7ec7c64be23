//! Notification outbox rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::rule::{ChannelKind, Severity};

/// Lifecycle of a notification intent. `Sent`, `Failed` and `Invalidated`
/// are terminal; the dispatcher never picks a terminal row up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum IntentStatus {
    /// Committed and awaiting delivery (or a retry).
    Pending,
    /// Delivered.
    Sent,
    /// Exhausted its retry budget; dead-lettered.
    Failed,
    /// Trigger was rolled back before delivery.
    Invalidated,
}

/// A durable notification intent: one row per
/// (rule, transaction, event, channel) occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationIntent {
    /// Intent identifier.
    pub intent_id: i64,

    /// Rule that fired.
    pub rule_id: i64,

    /// Hash of the triggering transaction.
    pub transaction_hash: String,

    /// Ordinal of the triggering event within the transaction, when the
    /// match was event-level.
    pub event_ordinal: Option<i64>,

    /// Delivery channel.
    pub channel: ChannelKind,

    /// Channel-specific destination.
    pub destination: String,

    /// Lifecycle status.
    pub status: IntentStatus,

    /// Delivery attempts made so far.
    pub attempts: i64,

    /// Error from the most recent failed attempt.
    pub last_error: Option<String>,

    /// Earliest time the next attempt may run.
    pub next_attempt_at: Option<DateTime<Utc>>,

    /// Why the intent was invalidated.
    pub invalidation_reason: Option<String>,

    /// When the intent was invalidated.
    pub invalidated_at: Option<DateTime<Utc>>,

    /// When the intent was created.
    pub created_at: DateTime<Utc>,
}

/// A pending intent joined with the rule fields the dispatcher needs to
/// build a delivery payload.
#[derive(Debug, Clone, FromRow)]
pub struct DispatchableIntent {
    /// Intent identifier.
    pub intent_id: i64,

    /// Rule that fired.
    pub rule_id: i64,

    /// Hash of the triggering transaction.
    pub transaction_hash: String,

    /// Ordinal of the triggering event, for event-level matches.
    pub event_ordinal: Option<i64>,

    /// Delivery channel.
    pub channel: ChannelKind,

    /// Channel-specific destination.
    pub destination: String,

    /// Delivery attempts made so far.
    pub attempts: i64,

    /// When the intent was created.
    pub created_at: DateTime<Utc>,

    /// Name of the rule that fired.
    pub rule_name: String,

    /// Severity of the rule that fired.
    pub severity: Severity,
}
