//! Identifiers: token classes, transactions and outpoints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// The all-zero identifier.
            pub const NULL: Self = Self([0u8; 32]);

            /// Creates an identifier from raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Returns the raw bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Returns true for the all-zero identifier.
            #[must_use]
            pub fn is_null(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// Lowercase hex encoding.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..16])
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s)
                    .map_err(|e| CoreError::InvalidId(format!("{}: {e}", stringify!($name))))?;
                let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
                    CoreError::InvalidId(format!("{} must be 32 bytes", stringify!($name)))
                })?;
                Ok(Self(bytes))
            }
        }
    };
}

hash_id!(
    /// Identifier of a transaction: the hash of its canonical encoding.
    TxId
);

hash_id!(
    /// Identifier of a token class: the id of the transaction that created it.
    TokenId
);

impl From<TxId> for TokenId {
    fn from(txid: TxId) -> Self {
        Self(txid.0)
    }
}

/// Reference to one output of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// Transaction that created the output.
    pub txid: TxId,
    /// Index of the output within that transaction.
    pub vout: u32,
}

impl OutPoint {
    /// Creates an outpoint.
    #[must_use]
    pub const fn new(txid: TxId, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}
