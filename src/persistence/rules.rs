//! Rule reads and the atomic firing claim.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::SqliteConnection;

use super::{error::PersistenceError, sqlite::SqliteStore};
use crate::models::rule::{AlertRule, ChannelConfig, RuleCriteria, RuleRow, Severity};

/// Parameters for seeding a rule. Full rule CRUD is owned by an external
/// collaborator; this exists for initial loading and tests.
#[derive(Debug, Clone)]
pub struct NewRule {
    /// Human-readable rule name.
    pub name: String,
    /// Owning account.
    pub owner: String,
    /// Variant-specific match criteria.
    pub criteria: RuleCriteria,
    /// Optional monitored-contract scope.
    pub contract_scope: Option<String>,
    /// Whether the rule participates in matching.
    pub active: bool,
    /// Severity carried into notifications.
    pub severity: Severity,
    /// Cooldown in seconds.
    pub cooldown_secs: i64,
    /// Channels to notify when the rule fires.
    pub channels: Vec<ChannelConfig>,
}

/// Attempts to claim firing rights for a rule with one conditional update:
/// it succeeds only when `last_fired_at` is unset or older than now minus the
/// rule's cooldown. Exactly one of any number of concurrent claimants sees an
/// affected row; everyone else must treat the rule as cooled down. This is
/// what keeps two evaluators (or two deliveries of the same upstream batch)
/// from double-firing.
pub async fn claim_firing(
    conn: &mut SqliteConnection,
    rule: &AlertRule,
    now: DateTime<Utc>,
) -> Result<bool, PersistenceError> {
    let cooldown =
        ChronoDuration::from_std(rule.cooldown).unwrap_or_else(|_| ChronoDuration::zero());
    let threshold = now - cooldown;

    let claimed = sqlx::query(
        "UPDATE alert_rules SET last_fired_at = ?, version = version + 1
         WHERE rule_id = ? AND active = 1
           AND (last_fired_at IS NULL OR last_fired_at <= ?)",
    )
    .bind(now)
    .bind(rule.rule_id)
    .bind(threshold)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(claimed == 1)
}

impl SqliteStore {
    /// Loads every active rule, for (re)building the rule index.
    pub async fn get_active_rules(&self) -> Result<Vec<AlertRule>, PersistenceError> {
        let rows = sqlx::query_as::<_, RuleRow>(
            "SELECT rule_id, name, owner, criteria, contract_scope, active, severity,
                    cooldown_secs, last_fired_at, channels, version
             FROM alert_rules WHERE active = 1 ORDER BY rule_id",
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(|row| AlertRule::try_from(row).map_err(PersistenceError::from))
            .collect()
    }

    /// Fetches one rule by id, active or not.
    pub async fn get_rule(&self, rule_id: i64) -> Result<Option<AlertRule>, PersistenceError> {
        let row = sqlx::query_as::<_, RuleRow>(
            "SELECT rule_id, name, owner, criteria, contract_scope, active, severity,
                    cooldown_secs, last_fired_at, channels, version
             FROM alert_rules WHERE rule_id = ?",
        )
        .bind(rule_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| AlertRule::try_from(r).map_err(PersistenceError::from)).transpose()
    }

    /// Inserts a rule and returns its id.
    pub async fn insert_rule(&self, rule: &NewRule) -> Result<i64, PersistenceError> {
        let now = Utc::now();
        let criteria = serde_json::to_string(&rule.criteria)?;
        let channels = serde_json::to_string(&rule.channels)?;

        let rule_id: i64 = sqlx::query_scalar(
            "INSERT INTO alert_rules
                 (name, owner, kind, criteria, contract_scope, active, severity,
                  cooldown_secs, channels, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING rule_id",
        )
        .bind(&rule.name)
        .bind(&rule.owner)
        .bind(rule.criteria.kind())
        .bind(criteria)
        .bind(&rule.contract_scope)
        .bind(rule.active)
        .bind(rule.severity)
        .bind(rule.cooldown_secs)
        .bind(channels)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        Ok(rule_id)
    }

    /// Overwrites a rule's last-fired time. Operator tooling for resetting a
    /// cooldown; also used by tests to set up claim scenarios.
    pub async fn set_rule_last_fired(
        &self,
        rule_id: i64,
        last_fired_at: Option<DateTime<Utc>>,
    ) -> Result<(), PersistenceError> {
        sqlx::query("UPDATE alert_rules SET last_fired_at = ?, version = version + 1 WHERE rule_id = ?")
            .bind(last_fired_at)
            .bind(rule_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Activates or deactivates a rule.
    pub async fn set_rule_active(&self, rule_id: i64, active: bool) -> Result<(), PersistenceError> {
        sqlx::query(
            "UPDATE alert_rules SET active = ?, version = version + 1, updated_at = ? WHERE rule_id = ?",
        )
        .bind(active)
        .bind(Utc::now())
        .bind(rule_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_helpers::{RuleBuilder, setup_store};

    #[tokio::test]
    async fn test_insert_and_get_active_rules() {
        let store = setup_store().await;

        let active = RuleBuilder::contract_call("0xpool", Some("swap")).build();
        let inactive = RuleBuilder::contract_call("0xother", None).active(false).build();
        store.insert_rule(&active).await.unwrap();
        store.insert_rule(&inactive).await.unwrap();

        let rules = store.get_active_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].criteria.kind(), "contract_call");
        assert!(rules[0].active);
    }

    #[tokio::test]
    async fn test_claim_firing_respects_cooldown() {
        let store = setup_store().await;
        let rule_id = store
            .insert_rule(&RuleBuilder::contract_call("0xpool", None).cooldown_secs(60).build())
            .await
            .unwrap();
        let rule = store.get_rule(rule_id).await.unwrap().unwrap();
        let mut conn = store.pool().acquire().await.unwrap();

        // Never fired: the first claim wins.
        assert!(claim_firing(&mut conn, &rule, Utc::now()).await.unwrap());

        // Just fired: within cooldown, the claim loses.
        assert!(!claim_firing(&mut conn, &rule, Utc::now()).await.unwrap());

        // Pretend the last firing was outside the window.
        store
            .set_rule_last_fired(rule_id, Some(Utc::now() - ChronoDuration::seconds(61)))
            .await
            .unwrap();
        assert!(claim_firing(&mut conn, &rule, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_firing_zero_cooldown_always_wins() {
        let store = setup_store().await;
        let rule_id = store
            .insert_rule(&RuleBuilder::contract_call("0xpool", None).cooldown_secs(0).build())
            .await
            .unwrap();
        let rule = store.get_rule(rule_id).await.unwrap().unwrap();
        assert_eq!(rule.cooldown, Duration::from_secs(0));

        let mut conn = store.pool().acquire().await.unwrap();
        assert!(claim_firing(&mut conn, &rule, Utc::now()).await.unwrap());
        assert!(claim_firing(&mut conn, &rule, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_firing_inactive_rule_never_wins() {
        let store = setup_store().await;
        let rule_id = store
            .insert_rule(&RuleBuilder::contract_call("0xpool", None).build())
            .await
            .unwrap();
        let rule = store.get_rule(rule_id).await.unwrap().unwrap();
        store.set_rule_active(rule_id, false).await.unwrap();

        let mut conn = store.pool().acquire().await.unwrap();
        assert!(!claim_firing(&mut conn, &rule, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_firing_bumps_version() {
        let store = setup_store().await;
        let rule_id = store
            .insert_rule(&RuleBuilder::contract_call("0xpool", None).build())
            .await
            .unwrap();
        let before = store.get_rule(rule_id).await.unwrap().unwrap();

        let mut conn = store.pool().acquire().await.unwrap();
        claim_firing(&mut conn, &before, Utc::now()).await.unwrap();

        let after = store.get_rule(rule_id).await.unwrap().unwrap();
        assert_eq!(after.version, before.version + 1);
        assert!(after.last_fired_at.is_some());
    }
}
