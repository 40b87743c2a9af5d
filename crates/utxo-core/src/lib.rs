//! # utxo-core
//!
//! Primitives for tokens recorded as entries in a UTXO-style ledger.
//!
//! This crate provides:
//!
//! - [`Amount`] — Non-negative integer quantities with checked arithmetic
//! - [`Keypair`], [`PublicKey`], [`KeyCustody`] — Ed25519 keys and the custody boundary
//! - [`SpendCondition`] — Single-key, address-hash and M-of-N locks
//! - [`SchemeVersion`] / [`TokenScheme`] — Legacy and generalized encodings
//! - [`LedgerEntry`] — Entries with order and token-creation payloads
//! - [`Transaction`] — Wire types, txid and sighash

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amount;
pub mod condition;
pub mod entry;
pub mod error;
pub mod ids;
pub mod keys;
pub mod scheme;
pub mod transaction;

pub use amount::Amount;
pub use condition::{IndexKey, MAX_THRESHOLD_KEYS, PLAIN_NAMESPACE, SpendCondition};
pub use entry::{
    Asset, EntryPayload, LedgerEntry, MAX_TOKEN_DESCRIPTION_LEN, MAX_TOKEN_NAME_LEN,
    OrderCancellation, OrderTerms, Side, TokenMeta,
};
pub use error::{CoreError, Result};
pub use ids::{OutPoint, TokenId, TxId};
pub use keys::{Address, CustodyChain, KeyCustody, Keypair, Keyring, PublicKey, Sighash, Signature};
pub use scheme::{GeneralizedScheme, Identity, LegacyScheme, SchemeVersion, TokenScheme};
pub use transaction::{SignatureFragment, Transaction, TxInput, TxOutput};
