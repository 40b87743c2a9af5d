//! # utxo-ledger
//!
//! The ledger side of the token core.
//!
//! - [`LedgerView`] / [`Broadcaster`] — What the core needs from a ledger node
//! - [`BalanceIndex`] — Balances and lookup keys across all scheme versions
//! - [`TokenRegistry`] — Token class info and listing
//! - [`MemoryLedger`] — In-memory reference ledger for development and tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod balance;
pub mod error;
pub mod memory;
pub mod registry;
pub mod view;

pub use balance::{BalanceIndex, SchemeIndexKeys};
pub use error::{LedgerError, Result};
pub use memory::MemoryLedger;
pub use registry::{TokenFilter, TokenInfo, TokenRegistry};
pub use view::{Broadcaster, LedgerView};
