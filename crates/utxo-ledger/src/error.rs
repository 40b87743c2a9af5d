//! Error types for ledger operations.

use thiserror::Error;
use utxo_core::{Amount, CoreError, OutPoint, TokenId};

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors raised by the ledger boundary and the reference ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An input references an entry the ledger has never seen.
    #[error("unknown input: {outpoint}")]
    UnknownInput {
        /// Missing entry.
        outpoint: OutPoint,
    },

    /// An input references an entry that is already spent.
    #[error("double spend of {outpoint}")]
    DoubleSpend {
        /// Entry already consumed.
        outpoint: OutPoint,
    },

    /// An input misstates the value, token or lock of the entry it spends.
    #[error("input {outpoint} does not match the ledger entry")]
    InputMismatch {
        /// Misdescribed entry.
        outpoint: OutPoint,
    },

    /// Input value does not cover outputs plus fee.
    #[error("unbalanced transaction: inputs {inputs}, outputs {outputs}, fee {fee}")]
    Unbalanced {
        /// Total input value.
        inputs: Amount,
        /// Total output value.
        outputs: Amount,
        /// Declared fee.
        fee: Amount,
    },

    /// Token units would be created or destroyed.
    #[error("token {token} not conserved: inputs {inputs}, outputs {outputs}")]
    TokenNotConserved {
        /// Token class.
        token: TokenId,
        /// Units consumed.
        inputs: Amount,
        /// Units produced.
        outputs: Amount,
    },

    /// An input's witness does not satisfy its condition.
    #[error("input {input} has {have} of {required} required signatures")]
    Unsatisfied {
        /// Input index.
        input: usize,
        /// Signatures needed.
        required: usize,
        /// Valid signatures present.
        have: usize,
    },

    /// Token has no creation entry in the registry.
    #[error("token not found: {token}")]
    TokenNotFound {
        /// Token class.
        token: TokenId,
    },

    /// Core primitive error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl LedgerError {
    /// Create an unknown-input error.
    #[must_use]
    pub const fn unknown_input(outpoint: OutPoint) -> Self {
        Self::UnknownInput { outpoint }
    }

    /// Create a double-spend error.
    #[must_use]
    pub const fn double_spend(outpoint: OutPoint) -> Self {
        Self::DoubleSpend { outpoint }
    }
}
