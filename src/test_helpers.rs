//! A set of helpers for testing

use chrono::Utc;

use crate::{
    models::{
        batch::{BlockData, ContractCall, ContractDeployment, EventData, TransactionData},
        event::EventDetail,
        rule::{AlertRule, ChannelConfig, ChannelKind, RuleCriteria, Severity},
    },
    persistence::{rules::NewRule, sqlite::SqliteStore},
};

/// Creates an in-memory store with migrations applied. Uses a uniquely named
/// shared-cache in-memory database so every pooled connection sees the same
/// data even while a test holds a connection checked out.
pub async fn setup_store() -> SqliteStore {
    let url =
        format!("sqlite:file:test-{}?mode=memory&cache=shared", uuid::Uuid::new_v4().simple());
    let store = SqliteStore::new(&url).await.expect("in-memory store");
    store.run_migrations().await.expect("migrations");
    store
}

/// A builder for creating `BlockData` instances for testing.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    block: BlockData,
}

impl BlockBuilder {
    /// Creates a builder for a block with the given hash.
    pub fn new(hash: &str) -> Self {
        Self {
            block: BlockData {
                hash: hash.to_string(),
                parent_hash: format!("{hash}-parent"),
                height: 1,
                timestamp: 1_700_000_000,
                miner: None,
                transactions: Vec::new(),
            },
        }
    }

    /// Sets the block height.
    pub fn height(mut self, height: i64) -> Self {
        self.block.height = height;
        self
    }

    /// Sets the parent hash.
    pub fn parent_hash(mut self, parent_hash: &str) -> Self {
        self.block.parent_hash = parent_hash.to_string();
        self
    }

    /// Appends a transaction.
    pub fn transaction(mut self, tx: TransactionData) -> Self {
        self.block.transactions.push(tx);
        self
    }

    /// Builds the `BlockData`.
    pub fn build(self) -> BlockData {
        self.block
    }
}

/// A builder for creating `TransactionData` instances for testing.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    tx: TransactionData,
}

impl TransactionBuilder {
    /// Creates a builder for a successful transaction with the given hash.
    pub fn new(hash: &str) -> Self {
        Self {
            tx: TransactionData {
                hash: hash.to_string(),
                sender: "0xalice".to_string(),
                success: true,
                ordinal: 0,
                fee: None,
                call: None,
                deployment: None,
                events: Vec::new(),
            },
        }
    }

    /// Sets the sender address.
    pub fn sender(mut self, sender: &str) -> Self {
        self.tx.sender = sender.to_string();
        self
    }

    /// Sets the success flag.
    pub fn success(mut self, success: bool) -> Self {
        self.tx.success = success;
        self
    }

    /// Sets the position within the block.
    pub fn ordinal(mut self, ordinal: i64) -> Self {
        self.tx.ordinal = ordinal;
        self
    }

    /// Attaches a contract call.
    pub fn call(mut self, contract: &str, function: &str) -> Self {
        self.tx.call = Some(ContractCall {
            contract: contract.to_string(),
            function: function.to_string(),
            args: None,
        });
        self
    }

    /// Attaches a contract deployment.
    pub fn deployment(mut self, contract: &str) -> Self {
        self.tx.deployment = Some(ContractDeployment { contract: contract.to_string() });
        self
    }

    /// Appends a fungible transfer event from `0xalice` to `0xbob`, emitted
    /// by contract `0xtoken`.
    pub fn transfer_event(self, asset: &str, amount: &str) -> Self {
        self.transfer_event_to(asset, amount, "0xalice", "0xbob")
    }

    /// Appends a fungible transfer event with explicit participants.
    pub fn transfer_event_to(mut self, asset: &str, amount: &str, from: &str, to: &str) -> Self {
        let ordinal = self.tx.events.len() as i64;
        self.tx.events.push(EventData {
            ordinal,
            contract: Some("0xtoken".to_string()),
            detail: EventDetail::FungibleTransfer {
                asset: asset.to_string(),
                amount: amount.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            },
        });
        self
    }

    /// Appends a generic contract log event.
    pub fn log_event(mut self, contract: &str, name: &str) -> Self {
        let ordinal = self.tx.events.len() as i64;
        self.tx.events.push(EventData {
            ordinal,
            contract: Some(contract.to_string()),
            detail: EventDetail::ContractLog {
                name: name.to_string(),
                data: serde_json::json!({}),
            },
        });
        self
    }

    /// Appends an arbitrary event.
    pub fn event(mut self, contract: Option<&str>, detail: EventDetail) -> Self {
        let ordinal = self.tx.events.len() as i64;
        self.tx.events.push(EventData {
            ordinal,
            contract: contract.map(str::to_string),
            detail,
        });
        self
    }

    /// Builds the `TransactionData`.
    pub fn build(self) -> TransactionData {
        self.tx
    }
}

/// A builder for creating rules for testing. `build` produces a `NewRule`
/// for seeding the store; `build_rule` produces an in-memory `AlertRule`.
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    rule: NewRule,
}

impl RuleBuilder {
    /// Creates a builder from explicit criteria.
    pub fn from_criteria(criteria: RuleCriteria) -> Self {
        Self {
            rule: NewRule {
                name: "test rule".to_string(),
                owner: "tester".to_string(),
                criteria,
                contract_scope: None,
                active: true,
                severity: Severity::Info,
                cooldown_secs: 0,
                channels: vec![ChannelConfig {
                    channel: ChannelKind::Webhook,
                    destination: "https://hooks.example.com/alerts".to_string(),
                }],
            },
        }
    }

    /// Creates a builder for a contract-call rule.
    pub fn contract_call(contract: &str, function: Option<&str>) -> Self {
        Self::from_criteria(RuleCriteria::ContractCall {
            contract: contract.to_string(),
            function: function.map(str::to_string),
        })
    }

    /// Creates a builder for a token-transfer rule.
    pub fn token_transfer(asset: &str, min_amount: Option<&str>) -> Self {
        Self::from_criteria(RuleCriteria::TokenTransfer {
            asset: asset.to_string(),
            min_amount: min_amount.map(str::to_string),
        })
    }

    /// Sets the rule name.
    pub fn name(mut self, name: &str) -> Self {
        self.rule.name = name.to_string();
        self
    }

    /// Sets the monitored-contract scope.
    pub fn contract_scope(mut self, scope: &str) -> Self {
        self.rule.contract_scope = Some(scope.to_string());
        self
    }

    /// Sets the active flag.
    pub fn active(mut self, active: bool) -> Self {
        self.rule.active = active;
        self
    }

    /// Sets the severity.
    pub fn severity(mut self, severity: Severity) -> Self {
        self.rule.severity = severity;
        self
    }

    /// Sets the cooldown in seconds.
    pub fn cooldown_secs(mut self, cooldown_secs: i64) -> Self {
        self.rule.cooldown_secs = cooldown_secs;
        self
    }

    /// Appends a channel, replacing the default webhook channel on first use.
    pub fn channel(mut self, channel: ChannelKind, destination: &str) -> Self {
        if self.rule.channels.len() == 1
            && self.rule.channels[0].destination == "https://hooks.example.com/alerts"
        {
            self.rule.channels.clear();
        }
        self.rule.channels.push(ChannelConfig { channel, destination: destination.to_string() });
        self
    }

    /// Builds a `NewRule` for insertion.
    pub fn build(self) -> NewRule {
        self.rule
    }

    /// Builds an in-memory `AlertRule` with the given id, as if freshly
    /// loaded from the store.
    pub fn build_rule(self, rule_id: i64) -> AlertRule {
        let rule = self.rule;
        AlertRule {
            rule_id,
            name: rule.name,
            owner: rule.owner,
            criteria: rule.criteria,
            contract_scope: rule.contract_scope,
            active: rule.active,
            severity: rule.severity,
            cooldown: std::time::Duration::from_secs(rule.cooldown_secs.max(0) as u64),
            last_fired_at: None,
            channels: rule.channels,
            version: 0,
        }
    }
}

/// Shorthand for a single-block apply batch.
pub fn apply_batch(block: BlockData) -> crate::models::batch::IngestBatch {
    crate::models::batch::IngestBatch::Apply { blocks: vec![block] }
}

/// Shorthand for a rollback batch.
pub fn rollback_batch(hashes: &[&str]) -> crate::models::batch::IngestBatch {
    crate::models::batch::IngestBatch::Rollback {
        block_hashes: hashes.iter().map(|h| h.to_string()).collect(),
    }
}

/// A timestamp helper for tests that need "now".
pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}
