//! Typed chain events.
//!
//! The event hierarchy is a closed tagged union: one `kind` discriminant
//! selecting among the variant payloads, matched exhaustively in the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Variant payload of a chain event.
///
/// Amounts are decimal strings so values larger than any fixed-width integer
/// survive persistence unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetail {
    /// Fungible token moved between two accounts.
    FungibleTransfer {
        /// Asset identifier.
        asset: String,
        /// Amount transferred.
        amount: String,
        /// Sending account.
        from: String,
        /// Receiving account.
        to: String,
    },
    /// Fungible token minted to an account.
    FungibleMint {
        /// Asset identifier.
        asset: String,
        /// Amount minted.
        amount: String,
        /// Receiving account.
        to: String,
    },
    /// Fungible token burned from an account.
    FungibleBurn {
        /// Asset identifier.
        asset: String,
        /// Amount burned.
        amount: String,
        /// Account burned from.
        from: String,
    },
    /// Non-fungible token moved between two accounts.
    NonFungibleTransfer {
        /// Collection identifier.
        asset: String,
        /// Token identifier within the collection.
        token: String,
        /// Sending account.
        from: String,
        /// Receiving account.
        to: String,
    },
    /// Non-fungible token minted to an account.
    NonFungibleMint {
        /// Collection identifier.
        asset: String,
        /// Token identifier within the collection.
        token: String,
        /// Receiving account.
        to: String,
    },
    /// Non-fungible token burned from an account.
    NonFungibleBurn {
        /// Collection identifier.
        asset: String,
        /// Token identifier within the collection.
        token: String,
        /// Account burned from.
        from: String,
    },
    /// Native coin moved between two accounts.
    NativeTransfer {
        /// Amount transferred.
        amount: String,
        /// Sending account.
        from: String,
        /// Receiving account.
        to: String,
    },
    /// Native coin minted to an account.
    NativeMint {
        /// Amount minted.
        amount: String,
        /// Receiving account.
        to: String,
    },
    /// Native coin burned from an account.
    NativeBurn {
        /// Amount burned.
        amount: String,
        /// Account burned from.
        from: String,
    },
    /// Native coin locked by an account.
    NativeLock {
        /// Amount locked.
        amount: String,
        /// Account that locked the coins.
        owner: String,
    },
    /// Generic contract log that does not fit a typed variant.
    ContractLog {
        /// Log name as emitted by the contract.
        name: String,
        /// Decoded log parameters.
        data: serde_json::Value,
    },
}

impl EventDetail {
    /// Returns the discriminant string persisted in the `kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            EventDetail::FungibleTransfer { .. } => "fungible_transfer",
            EventDetail::FungibleMint { .. } => "fungible_mint",
            EventDetail::FungibleBurn { .. } => "fungible_burn",
            EventDetail::NonFungibleTransfer { .. } => "non_fungible_transfer",
            EventDetail::NonFungibleMint { .. } => "non_fungible_mint",
            EventDetail::NonFungibleBurn { .. } => "non_fungible_burn",
            EventDetail::NativeTransfer { .. } => "native_transfer",
            EventDetail::NativeMint { .. } => "native_mint",
            EventDetail::NativeBurn { .. } => "native_burn",
            EventDetail::NativeLock { .. } => "native_lock",
            EventDetail::ContractLog { .. } => "contract_log",
        }
    }

    /// Returns the asset identifier, for token events.
    pub fn asset(&self) -> Option<&str> {
        match self {
            EventDetail::FungibleTransfer { asset, .. }
            | EventDetail::FungibleMint { asset, .. }
            | EventDetail::FungibleBurn { asset, .. }
            | EventDetail::NonFungibleTransfer { asset, .. }
            | EventDetail::NonFungibleMint { asset, .. }
            | EventDetail::NonFungibleBurn { asset, .. } => Some(asset),
            _ => None,
        }
    }

    /// Returns the amount, for events that carry one.
    pub fn amount(&self) -> Option<&str> {
        match self {
            EventDetail::FungibleTransfer { amount, .. }
            | EventDetail::FungibleMint { amount, .. }
            | EventDetail::FungibleBurn { amount, .. }
            | EventDetail::NativeTransfer { amount, .. }
            | EventDetail::NativeMint { amount, .. }
            | EventDetail::NativeBurn { amount, .. }
            | EventDetail::NativeLock { amount, .. } => Some(amount),
            _ => None,
        }
    }

    /// Returns the accounts participating in the event.
    pub fn participants(&self) -> Vec<&str> {
        match self {
            EventDetail::FungibleTransfer { from, to, .. }
            | EventDetail::NonFungibleTransfer { from, to, .. }
            | EventDetail::NativeTransfer { from, to, .. } => vec![from, to],
            EventDetail::FungibleMint { to, .. }
            | EventDetail::NonFungibleMint { to, .. }
            | EventDetail::NativeMint { to, .. } => vec![to],
            EventDetail::FungibleBurn { from, .. }
            | EventDetail::NonFungibleBurn { from, .. }
            | EventDetail::NativeBurn { from, .. } => vec![from],
            EventDetail::NativeLock { owner, .. } => vec![owner],
            EventDetail::ContractLog { .. } => vec![],
        }
    }

    /// Returns the sending side of the event, when there is one.
    pub fn sender(&self) -> Option<&str> {
        match self {
            EventDetail::FungibleTransfer { from, .. }
            | EventDetail::FungibleBurn { from, .. }
            | EventDetail::NonFungibleTransfer { from, .. }
            | EventDetail::NonFungibleBurn { from, .. }
            | EventDetail::NativeTransfer { from, .. }
            | EventDetail::NativeBurn { from, .. } => Some(from),
            EventDetail::NativeLock { owner, .. } => Some(owner),
            _ => None,
        }
    }

    /// Returns the receiving side of the event, when there is one.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            EventDetail::FungibleTransfer { to, .. }
            | EventDetail::FungibleMint { to, .. }
            | EventDetail::NonFungibleTransfer { to, .. }
            | EventDetail::NonFungibleMint { to, .. }
            | EventDetail::NativeTransfer { to, .. }
            | EventDetail::NativeMint { to, .. } => Some(to),
            _ => None,
        }
    }
}

/// A persisted chain event row. Unique on (transaction, ordinal, kind);
/// tombstoned together with its owning transaction, never partially.
#[derive(Debug, Clone, FromRow)]
pub struct EventRecord {
    /// Surrogate identifier assigned by the database.
    pub event_id: i64,

    /// Identifier of the owning transaction.
    pub tx_id: i64,

    /// Position of the event within its transaction.
    pub ordinal: i64,

    /// Tagged-union discriminant.
    pub kind: String,

    /// Emitting contract, when the event originated from one.
    pub contract_address: Option<String>,

    /// Asset identifier, for token events.
    pub asset_id: Option<String>,

    /// Amount, as a decimal string.
    pub amount: Option<String>,

    /// Sending account.
    pub sender: Option<String>,

    /// Receiving account.
    pub recipient: Option<String>,

    /// Full variant payload as JSON.
    pub payload: Option<String>,

    /// Tombstone flag, mirroring the owning transaction.
    pub deleted: bool,

    /// When the event was tombstoned.
    pub deleted_at: Option<DateTime<Utc>>,
}
