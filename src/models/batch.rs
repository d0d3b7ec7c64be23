//! Decoded inbound batches.
//!
//! The wire format and its decoding live at the transport edge; by the time a
//! batch reaches this crate it is already this shape. Children carry their
//! parent's business key so parent and children persist together in one unit
//! of work without back-pointers.

use serde::{Deserialize, Serialize};

use super::event::EventDetail;

/// An inbound batch: either new canonical blocks to apply, or block hashes
/// that are no longer canonical and must be tombstoned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum IngestBatch {
    /// New canonical blocks.
    Apply {
        /// Blocks to persist, with their transactions and events.
        blocks: Vec<BlockData>,
    },
    /// Previously applied blocks that were reorganised away.
    Rollback {
        /// Hashes of the blocks to tombstone.
        block_hashes: Vec<String>,
    },
}

/// A decoded block with its transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockData {
    /// Block hash (business key).
    pub hash: String,

    /// Hash of the parent block.
    pub parent_hash: String,

    /// Block height.
    pub height: i64,

    /// Block timestamp, seconds since the epoch.
    pub timestamp: i64,

    /// Producer of the block, when known.
    #[serde(default)]
    pub miner: Option<String>,

    /// Transactions contained in the block.
    #[serde(default)]
    pub transactions: Vec<TransactionData>,
}

/// A decoded transaction with its events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionData {
    /// Transaction hash (business key).
    pub hash: String,

    /// Sender address.
    pub sender: String,

    /// Whether the transaction executed successfully.
    pub success: bool,

    /// Position of the transaction within its block.
    pub ordinal: i64,

    /// Fee paid, as a decimal string.
    #[serde(default)]
    pub fee: Option<String>,

    /// Contract call details, when the transaction invoked a contract.
    #[serde(default)]
    pub call: Option<ContractCall>,

    /// Deployment details, when the transaction created a contract.
    #[serde(default)]
    pub deployment: Option<ContractDeployment>,

    /// Events emitted by the transaction.
    #[serde(default)]
    pub events: Vec<EventData>,
}

/// A contract invocation carried by a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractCall {
    /// Called contract.
    pub contract: String,

    /// Called function.
    pub function: String,

    /// Decoded call arguments.
    #[serde(default)]
    pub args: Option<serde_json::Value>,
}

/// A contract creation carried by a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDeployment {
    /// Address of the created contract.
    pub contract: String,
}

/// A decoded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    /// Position of the event within its transaction.
    pub ordinal: i64,

    /// Emitting contract, when the event originated from one.
    #[serde(default)]
    pub contract: Option<String>,

    /// Variant payload.
    #[serde(flatten)]
    pub detail: EventDetail,
}

/// Outcome of ingesting one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Blocks newly applied (including revivals of tombstoned blocks).
    pub applied: u64,

    /// Blocks tombstoned by this batch.
    pub rolled_back: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_batch_deserializes() {
        let json = serde_json::json!({
            "op": "apply",
            "blocks": [{
                "hash": "0xb1",
                "parent_hash": "0xb0",
                "height": 100,
                "timestamp": 1_700_000_000,
                "transactions": [{
                    "hash": "0xt1",
                    "sender": "0xalice",
                    "success": true,
                    "ordinal": 0,
                    "call": { "contract": "0xpool", "function": "swap" },
                    "events": [{
                        "ordinal": 0,
                        "contract": "0xusdc",
                        "kind": "fungible_transfer",
                        "asset": "usdc",
                        "amount": "250",
                        "from": "0xalice",
                        "to": "0xbob"
                    }]
                }]
            }]
        });

        let batch: IngestBatch = serde_json::from_value(json).unwrap();
        match batch {
            IngestBatch::Apply { blocks } => {
                assert_eq!(blocks.len(), 1);
                let tx = &blocks[0].transactions[0];
                assert_eq!(tx.call.as_ref().unwrap().function, "swap");
                assert_eq!(tx.events[0].detail.asset(), Some("usdc"));
            }
            IngestBatch::Rollback { .. } => panic!("expected apply batch"),
        }
    }

    #[test]
    fn test_rollback_batch_deserializes() {
        let json = r#"{ "op": "rollback", "block_hashes": ["0xb1", "0xb2"] }"#;
        let batch: IngestBatch = serde_json::from_str(json).unwrap();
        assert!(matches!(batch, IngestBatch::Rollback { ref block_hashes } if block_hashes.len() == 2));
    }
}
