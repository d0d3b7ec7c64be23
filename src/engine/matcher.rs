//! The alert matching engine.
//!
//! For every newly persisted transaction and each of its events: fetch
//! candidates from the rule index, evaluate the variant-specific predicate,
//! claim firing rights with the atomic cooldown update, then insert one
//! outbox row per configured channel. All writes go through the caller's
//! connection so they commit with the chain state that triggered them.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::sync::Arc;
use thiserror::Error;

use super::rule_index::RuleIndexService;
use crate::{
    models::{
        batch::{EventData, TransactionData},
        event::EventDetail,
        rule::{AlertRule, RuleCriteria},
    },
    persistence::{error::PersistenceError, outbox::insert_intent, rules::claim_firing},
};

/// A predicate could not be evaluated against a context. This fails the one
/// candidate, never the batch: the engine logs it and moves on.
#[derive(Debug, Error)]
pub enum PredicateError {
    /// An amount field did not parse as an unsigned decimal.
    #[error("invalid amount '{0}'")]
    InvalidAmount(String),
}

/// Evaluates rules against applied transactions and creates notification
/// intents for matches that win the firing claim.
pub struct MatchEngine {
    rules: Arc<RuleIndexService>,
}

impl MatchEngine {
    /// Creates a matching engine over the given rule index.
    pub fn new(rules: Arc<RuleIndexService>) -> Self {
        Self { rules }
    }

    /// Evaluates every candidate rule against a freshly persisted transaction
    /// and its events. Returns the number of intents created.
    pub async fn evaluate_transaction(
        &self,
        conn: &mut SqliteConnection,
        tx: &TransactionData,
        now: DateTime<Utc>,
    ) -> Result<u64, PersistenceError> {
        let index = self.rules.snapshot();
        let mut created = 0;

        let mut candidates: Vec<&Arc<AlertRule>> = Vec::new();
        if let Some(call) = &tx.call {
            candidates.extend(index.contract_call_candidates(&call.contract));
        }
        if !tx.success {
            candidates.extend(index.failed_transaction_candidates());
        }
        for address in transaction_addresses(tx) {
            candidates.extend(index.address_activity_candidates(address));
        }
        dedup_by_rule_id(&mut candidates);

        for rule in candidates {
            match matches_transaction(rule, tx) {
                Ok(true) => created += self.fire(conn, rule, &tx.hash, None, now).await?,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(rule_id = rule.rule_id, tx_hash = %tx.hash, error = %e,
                        "Predicate evaluation failed, skipping candidate.");
                }
            }
        }

        for event in &tx.events {
            let mut candidates: Vec<&Arc<AlertRule>> = Vec::new();
            if let Some(asset) = event.detail.asset() {
                candidates.extend(index.token_transfer_candidates(asset));
            }
            if let (EventDetail::ContractLog { .. }, Some(contract)) =
                (&event.detail, event.contract.as_deref())
            {
                candidates.extend(index.contract_log_candidates(contract));
            }
            for address in event.detail.participants() {
                candidates.extend(index.address_activity_candidates(address));
            }
            dedup_by_rule_id(&mut candidates);

            for rule in candidates {
                match matches_event(rule, event) {
                    Ok(true) => {
                        created +=
                            self.fire(conn, rule, &tx.hash, Some(event.ordinal), now).await?;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(rule_id = rule.rule_id, tx_hash = %tx.hash,
                            event_ordinal = event.ordinal, error = %e,
                            "Predicate evaluation failed, skipping candidate.");
                    }
                }
            }
        }

        Ok(created)
    }

    /// Claims firing rights, then inserts one intent per configured channel.
    async fn fire(
        &self,
        conn: &mut SqliteConnection,
        rule: &AlertRule,
        transaction_hash: &str,
        event_ordinal: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<u64, PersistenceError> {
        if !claim_firing(conn, rule, now).await? {
            tracing::debug!(rule_id = rule.rule_id, tx_hash = %transaction_hash,
                "Rule is cooling down, not firing.");
            return Ok(0);
        }

        let mut created = 0;
        for channel in &rule.channels {
            let inserted = insert_intent(
                conn,
                rule.rule_id,
                transaction_hash,
                event_ordinal,
                channel.channel,
                &channel.destination,
                now,
            )
            .await?;
            if inserted {
                created += 1;
            } else {
                tracing::debug!(rule_id = rule.rule_id, tx_hash = %transaction_hash,
                    channel = %channel.channel, "Occurrence already notified.");
            }
        }

        tracing::info!(rule_id = rule.rule_id, rule_name = %rule.name,
            tx_hash = %transaction_hash, intents = created, "Rule fired.");
        Ok(created)
    }
}

/// Addresses a transaction touches at the transaction level.
fn transaction_addresses(tx: &TransactionData) -> Vec<&str> {
    let mut addresses = vec![tx.sender.as_str()];
    if let Some(call) = &tx.call {
        addresses.push(call.contract.as_str());
    }
    if let Some(deployment) = &tx.deployment {
        addresses.push(deployment.contract.as_str());
    }
    addresses
}

fn dedup_by_rule_id(candidates: &mut Vec<&Arc<AlertRule>>) {
    candidates.sort_by_key(|r| r.rule_id);
    candidates.dedup_by_key(|r| r.rule_id);
}

/// Evaluates a rule's predicate against a transaction-level context.
fn matches_transaction(rule: &AlertRule, tx: &TransactionData) -> Result<bool, PredicateError> {
    if let Some(scope) = &rule.contract_scope {
        let in_scope = tx.call.as_ref().is_some_and(|c| &c.contract == scope)
            || tx.deployment.as_ref().is_some_and(|d| &d.contract == scope);
        if !in_scope {
            return Ok(false);
        }
    }

    Ok(match &rule.criteria {
        RuleCriteria::ContractCall { contract, function } => tx.call.as_ref().is_some_and(|c| {
            &c.contract == contract
                && function.as_ref().map_or(true, |f| f == &c.function)
        }),
        RuleCriteria::FailedTransaction { sender, contract } => {
            !tx.success
                && sender.as_ref().map_or(true, |s| s == &tx.sender)
                && contract
                    .as_ref()
                    .map_or(true, |c| tx.call.as_ref().is_some_and(|call| &call.contract == c))
        }
        RuleCriteria::AddressActivity { address } => {
            transaction_addresses(tx).contains(&address.as_str())
        }
        // Event-level kinds never match a transaction-level context.
        RuleCriteria::TokenTransfer { .. } | RuleCriteria::ContractLog { .. } => false,
    })
}

/// Evaluates a rule's predicate against an event-level context.
fn matches_event(rule: &AlertRule, event: &EventData) -> Result<bool, PredicateError> {
    if let Some(scope) = &rule.contract_scope {
        if event.contract.as_deref() != Some(scope.as_str()) {
            return Ok(false);
        }
    }

    match &rule.criteria {
        RuleCriteria::TokenTransfer { asset, min_amount } => {
            if event.detail.asset() != Some(asset.as_str()) {
                return Ok(false);
            }
            match min_amount {
                None => Ok(true),
                Some(min) => {
                    let Some(amount) = event.detail.amount() else {
                        // Non-fungible events carry no amount to compare.
                        return Ok(false);
                    };
                    Ok(parse_amount(amount)? >= parse_amount(min)?)
                }
            }
        }
        RuleCriteria::ContractLog { contract, event_name } => Ok(match &event.detail {
            EventDetail::ContractLog { name, .. } => {
                event.contract.as_deref() == Some(contract.as_str())
                    && event_name.as_ref().map_or(true, |n| n == name)
            }
            _ => false,
        }),
        RuleCriteria::AddressActivity { address } => {
            Ok(event.detail.participants().contains(&address.as_str()))
        }
        // Transaction-level kinds never match an event-level context.
        RuleCriteria::ContractCall { .. } | RuleCriteria::FailedTransaction { .. } => Ok(false),
    }
}

fn parse_amount(raw: &str) -> Result<u128, PredicateError> {
    raw.parse::<u128>().map_err(|_| PredicateError::InvalidAmount(raw.to_string()))
}
