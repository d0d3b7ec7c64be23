//! Delivery payloads built from dispatchable intents.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{intent::DispatchableIntent, rule::Severity};

/// The channel-independent content of one notification delivery.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    /// Name of the rule that fired.
    pub rule_name: String,

    /// Severity of the rule that fired.
    pub severity: Severity,

    /// Hash of the triggering transaction.
    pub transaction_hash: String,

    /// Ordinal of the triggering event, absent for transaction-level matches.
    pub event_ordinal: Option<i64>,

    /// When the intent was created.
    pub triggered_at: DateTime<Utc>,

    /// Delivery destination (webhook URL or email address).
    #[serde(skip)]
    pub destination: String,
}

impl NotificationPayload {
    /// Builds a payload from a fetched intent.
    pub fn from_intent(intent: &DispatchableIntent) -> Self {
        Self {
            rule_name: intent.rule_name.clone(),
            severity: intent.severity,
            transaction_hash: intent.transaction_hash.clone(),
            event_ordinal: intent.event_ordinal,
            triggered_at: intent.created_at,
            destination: intent.destination.clone(),
        }
    }

    /// The JSON body sent to webhook destinations.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self)
    }

    /// Subject line for email deliveries.
    pub fn subject(&self) -> String {
        format!("[{}] {}", self.severity, self.rule_name)
    }

    /// Plain-text body for email deliveries.
    pub fn body_text(&self) -> String {
        let mut body = format!(
            "Alert rule '{}' ({}) fired.\n\nTransaction: {}\n",
            self.rule_name, self.severity, self.transaction_hash
        );
        if let Some(ordinal) = self.event_ordinal {
            body.push_str(&format!("Event ordinal: {ordinal}\n"));
        }
        body.push_str(&format!("Triggered at: {}\n", self.triggered_at.to_rfc3339()));
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(event_ordinal: Option<i64>) -> NotificationPayload {
        NotificationPayload {
            rule_name: "large transfers".into(),
            severity: Severity::Critical,
            transaction_hash: "0xt1".into(),
            event_ordinal,
            triggered_at: Utc::now(),
            destination: "https://hooks.example.com/x".into(),
        }
    }

    #[test]
    fn test_json_omits_destination() {
        let json = payload(Some(2)).to_json();
        assert_eq!(json["rule_name"], "large transfers");
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["event_ordinal"], 2);
        assert!(json.get("destination").is_none());
    }

    #[test]
    fn test_email_rendering() {
        let payload = payload(None);
        assert_eq!(payload.subject(), "[critical] large transfers");
        let body = payload.body_text();
        assert!(body.contains("Transaction: 0xt1"));
        assert!(!body.contains("Event ordinal"));
    }
}
