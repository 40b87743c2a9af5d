//! # utxo-tx
//!
//! Transaction assembly for the token core.
//!
//! - [`Probe`] — Lock conditions an identity can satisfy, with signing material
//! - [`TxAssembler`] — Staged multi-transfer assembly with fee funding and change
//! - [`Signer`] — Signature collection, partial signing and co-signing
//! - [`select_largest_first`] — Deterministic coin selection

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod assembler;
pub mod config;
pub mod error;
pub mod probe;
pub mod selection;
pub mod signed;
pub mod signer;

pub use assembler::{AssemblerState, TxAssembler};
pub use config::{
    AssemblerConfig, AssemblerConfigBuilder, DEFAULT_DUST_THRESHOLD, DEFAULT_FEE,
    DEFAULT_MAX_INPUTS,
};
pub use error::{ErrorCategory, Result, TxError};
pub use probe::{tally, Probe, SignatureTally, SigningMaterial};
pub use selection::{order_candidates, select_largest_first, Selection};
pub use signed::{FinalizeOutcome, MissingSignatures, PartiallySignedTx, SignedTx};
pub use signer::Signer;
