//! Error types for utxo-market.

use thiserror::Error;
use utxo_core::{Amount, CoreError};
use utxo_ledger::LedgerError;
use utxo_tx::TxError;

use crate::order::{OrderId, OrderStatus};

/// Result type alias for market operations.
pub type Result<T> = std::result::Result<T, MarketError>;

/// Errors that can occur in order book operations.
#[derive(Debug, Error)]
pub enum MarketError {
    /// No order with this id exists on the ledger.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Cancel requested for an order that is no longer open.
    #[error("order {order_id} is not cancellable in status {status}")]
    OrderNotCancellable {
        /// The order.
        order_id: OrderId,
        /// Its current status.
        status: OrderStatus,
    },

    /// Fill requested for an order that is no longer open.
    #[error("order {order_id} is closed ({status})")]
    OrderClosed {
        /// The order.
        order_id: OrderId,
        /// Its current status.
        status: OrderStatus,
    },

    /// Fill requested past the order's expiry height.
    #[error("order {order_id} expired at height {expiry_height}")]
    OrderExpired {
        /// The order.
        order_id: OrderId,
        /// Last fillable height.
        expiry_height: u32,
    },

    /// Fill larger than what is left on the order.
    #[error("insufficient remaining amount: requested {requested}, remaining {remaining}")]
    InsufficientRemainingAmount {
        /// Units requested.
        requested: Amount,
        /// Units still open.
        remaining: Amount,
    },

    /// Fill price less favourable to the resting order than posted.
    #[error("price {offered} is worse than posted {posted}")]
    PriceWorseThanPosted {
        /// Price offered by the filler.
        offered: Amount,
        /// Price on the order.
        posted: Amount,
    },

    /// Requester does not control the order owner's key.
    #[error("requester does not own order {0}")]
    NotOrderOwner(OrderId),

    /// Order parameters rejected before any selection.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Price times quantity does not fit the amount range.
    #[error("amount overflow in {operation}")]
    AmountOverflow {
        /// What was being computed.
        operation: &'static str,
    },

    /// Legitimately unsupported operation.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Assembly or signing failed.
    #[error(transparent)]
    Tx(#[from] TxError),

    /// Ledger rejected the transaction or a lookup.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Core primitive error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl MarketError {
    /// Create an invalid order error.
    #[must_use]
    pub fn invalid_order(message: impl Into<String>) -> Self {
        Self::InvalidOrder(message.into())
    }

    /// Create a not-supported error.
    #[must_use]
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    /// Create an overflow error.
    #[must_use]
    pub const fn overflow(operation: &'static str) -> Self {
        Self::AmountOverflow { operation }
    }
}
