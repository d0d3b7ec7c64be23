//! Read-mostly in-memory index of active alert rules.
//!
//! Candidate lookup is O(1) on the rule kind plus a type-specific
//! discriminator. The index hands out immutable snapshots: an edit rebuilds
//! and swaps the whole thing, so an evaluator can never observe a rule
//! mid-mutation.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{
    models::rule::{AlertRule, RuleCriteria},
    persistence::{error::PersistenceError, sqlite::SqliteStore},
};

/// An immutable candidate index over active rules.
#[derive(Debug, Default)]
pub struct RuleIndex {
    /// Contract-call rules keyed by called contract.
    contract_call: HashMap<String, Vec<Arc<AlertRule>>>,

    /// Token-transfer rules keyed by asset identifier.
    token_transfer: HashMap<String, Vec<Arc<AlertRule>>>,

    /// Contract-log rules keyed by emitting contract.
    contract_log: HashMap<String, Vec<Arc<AlertRule>>>,

    /// Address-activity rules keyed by watched address.
    address_activity: HashMap<String, Vec<Arc<AlertRule>>>,

    /// Failed-transaction rules; candidates for every failed transaction.
    failed_transaction: Vec<Arc<AlertRule>>,

    /// Total number of indexed rules.
    len: usize,
}

const NO_RULES: &[Arc<AlertRule>] = &[];

impl RuleIndex {
    /// Builds an index from a set of active rules.
    pub fn build(rules: Vec<AlertRule>) -> Self {
        let mut index = RuleIndex::default();
        for rule in rules {
            let rule = Arc::new(rule);
            index.len += 1;
            match &rule.criteria {
                RuleCriteria::ContractCall { contract, .. } => {
                    index.contract_call.entry(contract.clone()).or_default().push(rule);
                }
                RuleCriteria::TokenTransfer { asset, .. } => {
                    index.token_transfer.entry(asset.clone()).or_default().push(rule);
                }
                RuleCriteria::ContractLog { contract, .. } => {
                    index.contract_log.entry(contract.clone()).or_default().push(rule);
                }
                RuleCriteria::AddressActivity { address } => {
                    index.address_activity.entry(address.clone()).or_default().push(rule);
                }
                RuleCriteria::FailedTransaction { .. } => {
                    index.failed_transaction.push(rule);
                }
            }
        }
        index
    }

    /// Contract-call candidates for a called contract.
    pub fn contract_call_candidates(&self, contract: &str) -> &[Arc<AlertRule>] {
        self.contract_call.get(contract).map_or(NO_RULES, Vec::as_slice)
    }

    /// Token-transfer candidates for an asset.
    pub fn token_transfer_candidates(&self, asset: &str) -> &[Arc<AlertRule>] {
        self.token_transfer.get(asset).map_or(NO_RULES, Vec::as_slice)
    }

    /// Contract-log candidates for an emitting contract.
    pub fn contract_log_candidates(&self, contract: &str) -> &[Arc<AlertRule>] {
        self.contract_log.get(contract).map_or(NO_RULES, Vec::as_slice)
    }

    /// Address-activity candidates for an address.
    pub fn address_activity_candidates(&self, address: &str) -> &[Arc<AlertRule>] {
        self.address_activity.get(address).map_or(NO_RULES, Vec::as_slice)
    }

    /// Candidates for failed transactions.
    pub fn failed_transaction_candidates(&self) -> &[Arc<AlertRule>] {
        &self.failed_transaction
    }

    /// Total number of indexed rules.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the index holds no rules.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Owns the current index snapshot and rebuilds it from the store whenever a
/// rule is created, (de)activated or deleted.
pub struct RuleIndexService {
    store: Arc<SqliteStore>,
    index: RwLock<Arc<RuleIndex>>,
}

impl RuleIndexService {
    /// Builds the service with an initial snapshot loaded from the store.
    pub async fn new(store: Arc<SqliteStore>) -> Result<Self, PersistenceError> {
        let service = Self { store, index: RwLock::new(Arc::new(RuleIndex::default())) };
        service.rebuild().await?;
        Ok(service)
    }

    /// Reloads active rules and swaps in a fresh snapshot.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn rebuild(&self) -> Result<(), PersistenceError> {
        let rules = self.store.get_active_rules().await?;
        let index = Arc::new(RuleIndex::build(rules));
        tracing::debug!(rules = index.len(), "Rebuilt rule index.");
        *self.index.write().expect("rule index lock poisoned") = index;
        Ok(())
    }

    /// Returns the current immutable snapshot.
    pub fn snapshot(&self) -> Arc<RuleIndex> {
        self.index.read().expect("rule index lock poisoned").clone()
    }
}
