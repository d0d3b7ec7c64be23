//! Alert rule definitions.
//!
//! Rule CRUD lives outside this crate; the engine only reads active rules and
//! performs the atomic firing claim against `last_fired_at`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Variant-specific match criteria of an alert rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCriteria {
    /// Fires when a transaction calls a contract, optionally a specific
    /// function of it.
    ContractCall {
        /// Called contract to match.
        contract: String,
        /// Called function to match; any function when unset.
        #[serde(default)]
        function: Option<String>,
    },
    /// Fires on token movement for an asset.
    TokenTransfer {
        /// Asset identifier to match.
        asset: String,
        /// Minimum amount (inclusive, decimal string); any amount when unset.
        #[serde(default)]
        min_amount: Option<String>,
    },
    /// Fires when a transaction fails.
    FailedTransaction {
        /// Sender to match; any sender when unset.
        #[serde(default)]
        sender: Option<String>,
        /// Called contract to match; any contract when unset.
        #[serde(default)]
        contract: Option<String>,
    },
    /// Fires on a generic contract log.
    ContractLog {
        /// Emitting contract to match.
        contract: String,
        /// Log name to match; any log when unset.
        #[serde(default)]
        event_name: Option<String>,
    },
    /// Fires on any activity involving an address.
    AddressActivity {
        /// Address to watch.
        address: String,
    },
}

impl RuleCriteria {
    /// Returns the discriminant string persisted in the `kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            RuleCriteria::ContractCall { .. } => "contract_call",
            RuleCriteria::TokenTransfer { .. } => "token_transfer",
            RuleCriteria::FailedTransaction { .. } => "failed_transaction",
            RuleCriteria::ContractLog { .. } => "contract_log",
            RuleCriteria::AddressActivity { .. } => "address_activity",
        }
    }
}

/// Severity attached to a rule and carried into its notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    #[default]
    Info,
    /// Worth looking at.
    Warning,
    /// Page somebody.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Delivery channel kinds supported by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Outbound webhook.
    Webhook,
    /// Email over SMTP.
    Email,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Webhook => write!(f, "webhook"),
            ChannelKind::Email => write!(f, "email"),
        }
    }
}

/// A channel configured on a rule: where to deliver when the rule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel kind.
    pub channel: ChannelKind,

    /// Channel-specific destination: a URL for webhooks, a recipient address
    /// for email.
    pub destination: String,
}

/// An alert rule as the engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    /// Rule identifier.
    pub rule_id: i64,

    /// Human-readable rule name.
    pub name: String,

    /// Owning account.
    pub owner: String,

    /// Variant-specific match criteria.
    pub criteria: RuleCriteria,

    /// Optional monitored-contract scope; when set, the matched context's
    /// contract must equal it.
    pub contract_scope: Option<String>,

    /// Whether the rule participates in matching.
    pub active: bool,

    /// Severity carried into notifications.
    pub severity: Severity,

    /// Minimum time between successive firings.
    pub cooldown: Duration,

    /// When the rule last fired.
    pub last_fired_at: Option<DateTime<Utc>>,

    /// Channels to notify when the rule fires.
    pub channels: Vec<ChannelConfig>,

    /// Version counter bumped on every firing claim and external edit.
    pub version: i64,
}

/// Raw `alert_rules` row; criteria and channels are JSON columns.
#[derive(Debug, Clone, FromRow)]
pub struct RuleRow {
    /// Rule identifier.
    pub rule_id: i64,
    /// Rule name.
    pub name: String,
    /// Owning account.
    pub owner: String,
    /// Criteria JSON.
    pub criteria: String,
    /// Optional monitored-contract scope.
    pub contract_scope: Option<String>,
    /// Active flag.
    pub active: bool,
    /// Severity.
    pub severity: Severity,
    /// Cooldown in seconds.
    pub cooldown_secs: i64,
    /// When the rule last fired.
    pub last_fired_at: Option<DateTime<Utc>>,
    /// Channels JSON.
    pub channels: String,
    /// Version counter.
    pub version: i64,
}

impl TryFrom<RuleRow> for AlertRule {
    type Error = serde_json::Error;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let criteria: RuleCriteria = serde_json::from_str(&row.criteria)?;
        let channels: Vec<ChannelConfig> = serde_json::from_str(&row.channels)?;
        Ok(AlertRule {
            rule_id: row.rule_id,
            name: row.name,
            owner: row.owner,
            criteria,
            contract_scope: row.contract_scope,
            active: row.active,
            severity: row.severity,
            cooldown: Duration::from_secs(row.cooldown_secs.max(0) as u64),
            last_fired_at: row.last_fired_at,
            channels,
            version: row.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_serde_round_trip() {
        let criteria = RuleCriteria::ContractCall {
            contract: "0xpool".into(),
            function: Some("swap".into()),
        };
        let json = serde_json::to_string(&criteria).unwrap();
        assert!(json.contains("\"kind\":\"contract_call\""));
        let back: RuleCriteria = serde_json::from_str(&json).unwrap();
        assert_eq!(back, criteria);
    }

    #[test]
    fn test_rule_row_conversion() {
        let row = RuleRow {
            rule_id: 7,
            name: "Large transfers".into(),
            owner: "ops".into(),
            criteria: r#"{"kind":"token_transfer","asset":"usdc","min_amount":"1000"}"#.into(),
            contract_scope: None,
            active: true,
            severity: Severity::Warning,
            cooldown_secs: 300,
            last_fired_at: None,
            channels: r#"[{"channel":"email","destination":"ops@example.com"}]"#.into(),
            version: 2,
        };

        let rule = AlertRule::try_from(row).unwrap();
        assert_eq!(rule.criteria.kind(), "token_transfer");
        assert_eq!(rule.cooldown, Duration::from_secs(300));
        assert_eq!(rule.channels[0].channel, ChannelKind::Email);
    }

    #[test]
    fn test_rule_row_conversion_rejects_bad_json() {
        let row = RuleRow {
            rule_id: 1,
            name: "broken".into(),
            owner: "ops".into(),
            criteria: "not json".into(),
            contract_scope: None,
            active: true,
            severity: Severity::Info,
            cooldown_secs: 0,
            last_fired_at: None,
            channels: "[]".into(),
            version: 0,
        };
        assert!(AlertRule::try_from(row).is_err());
    }
}
