//! Error types for transaction assembly.

use thiserror::Error;
use utxo_core::{Amount, CoreError, OutPoint, TokenId};
use utxo_ledger::LedgerError;

use crate::assembler::AssemblerState;

/// Result type alias for assembly operations.
pub type Result<T> = std::result::Result<T, TxError>;

/// Broad classes of failure, for callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed request; nothing was selected or changed.
    Validation,
    /// Not enough tokens or base value; top up and retry.
    ResourceExhausted,
    /// Lost a race with another builder; rebuild and retry.
    Concurrency,
    /// Internal invariant broken; never retry blindly.
    Fatal,
    /// Legitimately unsupported operation.
    NotSupported,
}

/// Errors raised while staging, finalizing or signing transactions.
#[derive(Debug, Error)]
pub enum TxError {
    /// Operation not allowed in the assembler's current state.
    #[error("invalid assembler state: expected {expected}, found {found}")]
    InvalidState {
        /// State the operation requires.
        expected: AssemblerState,
        /// State the assembler is in.
        found: AssemblerState,
    },

    /// Request rejected before any selection took place.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Source identities do not hold enough of the token.
    #[error("insufficient funds for token {token}: required {required}, available {available}")]
    InsufficientTokenFunds {
        /// Token class.
        token: TokenId,
        /// Units needed.
        required: Amount,
        /// Units selectable.
        available: Amount,
    },

    /// Funding probes do not cover fees and plain outputs.
    #[error("insufficient fee funds: required {required}, available {available}")]
    InsufficientFeeFunds {
        /// Additional base value needed.
        required: Amount,
        /// Base value selectable.
        available: Amount,
    },

    /// A selected input was spent before the transaction was finalized.
    #[error("stale input {outpoint}: spent since selection")]
    StaleInput {
        /// The input no longer unspent.
        outpoint: OutPoint,
    },

    /// Token outputs do not match token inputs.
    #[error("conservation violated for token {token}: inputs {inputs}, outputs {outputs}")]
    ConservationViolation {
        /// Token class.
        token: TokenId,
        /// Units consumed.
        inputs: Amount,
        /// Units produced.
        outputs: Amount,
    },

    /// Legitimately unsupported operation.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Core primitive error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Ledger error.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Partial transaction (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TxError {
    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a not-supported error.
    #[must_use]
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    /// Which class of failure this is.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidState { .. } | Self::InvalidRequest(_) | Self::Serialization(_) => {
                ErrorCategory::Validation
            }
            Self::InsufficientTokenFunds { .. } | Self::InsufficientFeeFunds { .. } => {
                ErrorCategory::ResourceExhausted
            }
            Self::StaleInput { .. } => ErrorCategory::Concurrency,
            Self::ConservationViolation { .. } => ErrorCategory::Fatal,
            Self::NotSupported(_) | Self::Core(CoreError::NotSupported(_)) => {
                ErrorCategory::NotSupported
            }
            Self::Core(_) => ErrorCategory::Validation,
            Self::Ledger(LedgerError::DoubleSpend { .. }) => ErrorCategory::Concurrency,
            Self::Ledger(LedgerError::Core(CoreError::NotSupported(_))) => {
                ErrorCategory::NotSupported
            }
            Self::Ledger(_) => ErrorCategory::Validation,
        }
    }

    /// Whether the caller may rebuild and retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Concurrency | ErrorCategory::ResourceExhausted
        )
    }
}
