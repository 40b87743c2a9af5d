//! Boundary traits between the core and the ledger it runs against.

use utxo_core::{IndexKey, LedgerEntry, OutPoint, SignatureFragment, Transaction, TxId};

use crate::error::Result;

/// Read-only access to the live entry index.
///
/// Implementations answer against a point-in-time snapshot and must be safe
/// to query from many threads at once.
pub trait LedgerView: Send + Sync {
    /// Every entry filed under `key`, spent ones included and flagged.
    fn lookup_by_key(&self, key: &IndexKey) -> Vec<LedgerEntry>;

    /// Whether `outpoint` exists and has not been consumed.
    fn is_unspent(&self, outpoint: &OutPoint) -> bool;

    /// The entry at `outpoint`, if known.
    fn entry(&self, outpoint: &OutPoint) -> Option<LedgerEntry>;

    /// Current chain height.
    fn height(&self) -> u32;
}

/// Accepts signed transactions for relay.
pub trait Broadcaster: Send + Sync {
    /// Submits `tx` with one witness per input.
    fn broadcast(&self, tx: &Transaction, witnesses: &[Vec<SignatureFragment>]) -> Result<TxId>;
}
