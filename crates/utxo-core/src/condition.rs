//! Spending conditions and the lookup keys derived from them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::keys::{Address, PublicKey};

/// Maximum number of keys in a threshold condition.
pub const MAX_THRESHOLD_KEYS: usize = 128;

/// The predicate that must be satisfied to consume a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpendCondition {
    /// Spendable by one signature from this key.
    SingleKey(PublicKey),
    /// Spendable by one signature from any key hashing to this address.
    AddressHash(Address),
    /// Spendable by `m` valid signatures from the ordered `keys`.
    Threshold {
        /// Required signatures.
        m: u8,
        /// Authorized keys, in declaration order.
        keys: Vec<PublicKey>,
    },
}

impl SpendCondition {
    /// Builds a validated threshold condition.
    ///
    /// Requires `1 <= m <= keys.len() <= MAX_THRESHOLD_KEYS` and no repeated keys.
    pub fn threshold(m: u8, keys: Vec<PublicKey>) -> Result<Self> {
        let condition = Self::Threshold { m, keys };
        condition.validate()?;
        Ok(condition)
    }

    /// Checks structural validity.
    pub fn validate(&self) -> Result<()> {
        if let Self::Threshold { m, keys } = self {
            if keys.is_empty() || keys.len() > MAX_THRESHOLD_KEYS {
                return Err(CoreError::invalid_condition(format!(
                    "threshold needs 1..={MAX_THRESHOLD_KEYS} keys, got {}",
                    keys.len()
                )));
            }
            if *m == 0 || usize::from(*m) > keys.len() {
                return Err(CoreError::invalid_condition(format!(
                    "threshold m={m} out of range for n={}",
                    keys.len()
                )));
            }
            let distinct: BTreeSet<_> = keys.iter().collect();
            if distinct.len() != keys.len() {
                return Err(CoreError::invalid_condition("threshold keys must be distinct"));
            }
        }
        Ok(())
    }

    /// Number of valid signatures needed to satisfy the condition.
    #[must_use]
    pub fn required_signatures(&self) -> usize {
        match self {
            Self::SingleKey(_) | Self::AddressHash(_) => 1,
            Self::Threshold { m, .. } => usize::from(*m),
        }
    }

    /// Whether a signature by `key` counts towards satisfying the condition.
    #[must_use]
    pub fn authorizes(&self, key: &PublicKey) -> bool {
        match self {
            Self::SingleKey(pk) => pk == key,
            Self::AddressHash(addr) => key.address() == *addr,
            Self::Threshold { keys, .. } => keys.contains(key),
        }
    }

    /// Keys named explicitly by the condition (none for an address hash).
    #[must_use]
    pub fn declared_keys(&self) -> Vec<PublicKey> {
        match self {
            Self::SingleKey(pk) => vec![*pk],
            Self::AddressHash(_) => Vec::new(),
            Self::Threshold { keys, .. } => keys.clone(),
        }
    }

    /// Canonical byte encoding: `tag || m || n || keys` or `tag || hash`.
    ///
    /// `n` is a little-endian `u32` so unvalidated key lists still encode
    /// unambiguously.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Self::SingleKey(pk) => {
                let mut out = Vec::with_capacity(35);
                out.extend_from_slice(&[0x01, 1, 1]);
                out.extend_from_slice(pk.as_bytes());
                out
            }
            Self::AddressHash(addr) => {
                let mut out = Vec::with_capacity(21);
                out.push(0x02);
                out.extend_from_slice(addr.as_bytes());
                out
            }
            Self::Threshold { m, keys } => {
                let mut out = Vec::with_capacity(6 + keys.len() * 32);
                out.push(0x03);
                out.push(*m);
                out.extend_from_slice(&(keys.len() as u32).to_le_bytes());
                for pk in keys {
                    out.extend_from_slice(pk.as_bytes());
                }
                out
            }
        }
    }
}

impl fmt::Display for SpendCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleKey(pk) => write!(f, "key({pk})"),
            Self::AddressHash(addr) => write!(f, "addr({addr})"),
            Self::Threshold { m, keys } => write!(f, "{m}-of-{}", keys.len()),
        }
    }
}

/// A lookup key under which the ledger index files entries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexKey(String);

/// Namespace byte for entries carrying no token.
pub const PLAIN_NAMESPACE: u8 = 0x00;

impl IndexKey {
    /// Derives the key for `condition` in the given namespace.
    #[must_use]
    pub fn derive(namespace: u8, condition: &SpendCondition) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"utxo-index");
        hasher.update(&[namespace]);
        hasher.update(&condition.canonical_bytes());
        let digest = hasher.finalize();
        Self(bs58::encode(&digest.as_bytes()[..20]).into_string())
    }

    /// Key for plain-value entries locked by `condition`.
    #[must_use]
    pub fn plain(condition: &SpendCondition) -> Self {
        Self::derive(PLAIN_NAMESPACE, condition)
    }

    /// The encoded key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
