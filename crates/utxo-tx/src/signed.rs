//! Finalization artifacts: broadcast-ready and partially signed transactions.

use serde::{Deserialize, Serialize};
use utxo_core::{SignatureFragment, TokenId, Transaction, TxId};
use utxo_ledger::Broadcaster;

use crate::error::Result;

/// A transaction whose every input is satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    /// The transaction.
    pub tx: Transaction,
    /// One witness per input.
    pub witnesses: Vec<Vec<SignatureFragment>>,
}

impl SignedTx {
    /// Transaction id.
    #[must_use]
    pub fn txid(&self) -> TxId {
        self.tx.txid()
    }

    /// Id of the token this transaction creates, if any.
    #[must_use]
    pub fn created_token(&self) -> Option<TokenId> {
        self.tx.creates_token().then(|| TokenId::from(self.txid()))
    }

    /// Hands the transaction to a broadcast collaborator.
    pub fn broadcast(&self, broadcaster: &dyn Broadcaster) -> Result<TxId> {
        Ok(broadcaster.broadcast(&self.tx, &self.witnesses)?)
    }
}

/// Signatures an input still lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingSignatures {
    /// Input index.
    pub input: usize,
    /// Signatures the input's condition needs.
    pub required: usize,
    /// Valid signatures collected so far.
    pub have: usize,
}

impl MissingSignatures {
    /// Further valid signatures needed.
    #[must_use]
    pub const fn needed(&self) -> usize {
        self.required.saturating_sub(self.have)
    }
}

/// A transaction awaiting co-signers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartiallySignedTx {
    /// The transaction.
    pub tx: Transaction,
    /// Fragments collected so far, one list per input.
    pub witnesses: Vec<Vec<SignatureFragment>>,
    /// Inputs whose conditions are not yet met.
    pub missing: Vec<MissingSignatures>,
}

impl PartiallySignedTx {
    /// Transaction id.
    #[must_use]
    pub fn txid(&self) -> TxId {
        self.tx.txid()
    }

    /// Total further signatures needed across all inputs.
    #[must_use]
    pub fn signatures_needed(&self) -> usize {
        self.missing.iter().map(MissingSignatures::needed).sum()
    }

    /// Serializes for hand-off to another party.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Restores a partial transaction received from another party.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Result of finalizing or co-signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Ready for broadcast.
    Signed(SignedTx),
    /// Needs more signatures; not an error.
    PartiallySigned(PartiallySignedTx),
}

impl FinalizeOutcome {
    /// Whether every input is satisfied.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Signed(_))
    }

    /// Transaction id.
    #[must_use]
    pub fn txid(&self) -> TxId {
        match self {
            Self::Signed(signed) => signed.txid(),
            Self::PartiallySigned(partial) => partial.txid(),
        }
    }

    /// The signed transaction, if complete.
    #[must_use]
    pub fn signed(self) -> Option<SignedTx> {
        match self {
            Self::Signed(signed) => Some(signed),
            Self::PartiallySigned(_) => None,
        }
    }

    /// The partial transaction, if incomplete.
    #[must_use]
    pub fn partial(self) -> Option<PartiallySignedTx> {
        match self {
            Self::Signed(_) => None,
            Self::PartiallySigned(partial) => Some(partial),
        }
    }
}
