//! Order identity, status and snapshots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utxo_core::{
    Amount, CoreError, LedgerEntry, OrderTerms, OutPoint, PublicKey, SchemeVersion, Side, TokenId,
    TxId,
};

/// Stable order identifier: the id of the transaction that posted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(TxId);

impl OrderId {
    /// Wraps a posting transaction id.
    #[must_use]
    pub const fn new(txid: TxId) -> Self {
        Self(txid)
    }

    /// The posting transaction id.
    #[must_use]
    pub const fn txid(&self) -> TxId {
        self.0
    }
}

impl From<TxId> for OrderId {
    fn from(txid: TxId) -> Self {
        Self(txid)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Posted, nothing filled yet.
    Open,
    /// Some quantity filled, the rest still open.
    PartiallyFilled,
    /// Fully filled.
    Filled,
    /// Withdrawn by its owner.
    Cancelled,
}

impl OrderStatus {
    /// Checks if a transition to the target status is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: &Self) -> bool {
        use OrderStatus::{Cancelled, Filled, Open, PartiallyFilled};

        matches!(
            (self, target),
            (Open | PartiallyFilled, PartiallyFilled | Filled | Cancelled)
        )
    }

    /// Returns true while the order can still be filled or cancelled.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open | Self::PartiallyFilled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::PartiallyFilled => write!(f, "PartiallyFilled"),
            Self::Filled => write!(f, "Filled"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Point-in-time view of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Stable id.
    pub id: OrderId,
    /// Entry currently carrying the order.
    pub outpoint: OutPoint,
    /// Bid or ask.
    pub side: Side,
    /// Token traded.
    pub token: TokenId,
    /// Owner key.
    pub owner: PublicKey,
    /// Quantity originally posted.
    pub total: Amount,
    /// Quantity still open.
    pub remaining: Amount,
    /// Base units per token unit.
    pub unit_price: Amount,
    /// Last fillable height.
    pub expiry_height: u32,
    /// Value locked in the carrying entry.
    pub locked: Amount,
    /// Scheme of the carrying entry.
    pub scheme: SchemeVersion,
    /// Current status.
    pub status: OrderStatus,
}

impl Order {
    /// Builds a snapshot from an order entry, or `None` for other entries.
    #[must_use]
    pub fn from_entry(entry: &LedgerEntry) -> Option<Self> {
        let terms = entry.order_terms()?;
        Some(Self::from_terms(entry, terms))
    }

    fn from_terms(entry: &LedgerEntry, terms: &OrderTerms) -> Self {
        let status = if entry.spent {
            // Spent with no continuation recorded; the book refines this.
            OrderStatus::Filled
        } else if terms.remaining == terms.total {
            OrderStatus::Open
        } else {
            OrderStatus::PartiallyFilled
        };
        Self {
            id: OrderId::new(terms.order_id(&entry.outpoint)),
            outpoint: entry.outpoint,
            side: terms.side,
            token: terms.token,
            owner: terms.owner,
            total: terms.total,
            remaining: terms.remaining,
            unit_price: terms.unit_price,
            expiry_height: terms.expiry_height,
            locked: entry.value,
            scheme: entry.scheme,
            status,
        }
    }

    /// Whether the order is past its expiry at `height`.
    #[must_use]
    pub const fn is_expired(&self, height: u32) -> bool {
        height > self.expiry_height
    }

    /// Quantity already filled.
    #[must_use]
    pub fn filled(&self) -> Amount {
        self.total.checked_sub(self.remaining).unwrap_or(Amount::ZERO)
    }
}
