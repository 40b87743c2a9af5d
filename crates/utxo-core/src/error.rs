//! Error types for utxo-core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while constructing or validating core primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid amount (negative or out of range).
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Checked arithmetic left the signed 64-bit range.
    #[error("amount overflow in {operation}")]
    AmountOverflow {
        /// The arithmetic operation that overflowed.
        operation: &'static str,
    },

    /// Malformed identifier (token id, tx id, outpoint).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Invalid signature.
    #[error("invalid signature")]
    InvalidSignature,

    /// Identity cannot be mapped to any lookup key.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Spending condition is structurally invalid.
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    /// Token metadata violates a protocol limit.
    #[error("invalid token metadata: {0}")]
    InvalidTokenMeta(String),

    /// The operation is legitimately unsupported (not a malformed request).
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Create an invalid identity error.
    #[must_use]
    pub fn invalid_identity(message: impl Into<String>) -> Self {
        Self::InvalidIdentity(message.into())
    }

    /// Create an invalid condition error.
    #[must_use]
    pub fn invalid_condition(message: impl Into<String>) -> Self {
        Self::InvalidCondition(message.into())
    }

    /// Create a not-supported error.
    #[must_use]
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    /// Create an overflow error for the named operation.
    #[must_use]
    pub const fn overflow(operation: &'static str) -> Self {
        Self::AmountOverflow { operation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_display_names_operation() {
        let err = CoreError::overflow("price * quantity");
        assert!(err.to_string().contains("price * quantity"));
    }

    #[test]
    fn not_supported_display() {
        let err = CoreError::not_supported("threshold under legacy scheme");
        assert_eq!(err.to_string(), "not supported: threshold under legacy scheme");
    }
}
