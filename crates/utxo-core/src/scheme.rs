//! Token scheme versions and their capability interface.
//!
//! Two on-ledger encodings coexist: the legacy single-key scheme (V1) and the
//! generalized M-of-N scheme (V2). Every entry, output and probe carries its
//! [`SchemeVersion`], and behaviour that differs between the two is reached
//! through [`TokenScheme`] rather than by branching on the tag.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::condition::{IndexKey, SpendCondition};
use crate::error::{CoreError, Result};
use crate::keys::{Address, Keypair, PublicKey};

/// Scheme version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum SchemeVersion {
    /// Legacy single-key encoding.
    V1,
    /// Generalized M-of-N encoding.
    #[default]
    V2,
}

impl SchemeVersion {
    /// Every known version, oldest first.
    pub const ALL: [Self; 2] = [Self::V1, Self::V2];

    /// Capability interface for this version.
    #[must_use]
    pub fn scheme(self) -> &'static dyn TokenScheme {
        match self {
            Self::V1 => &LegacyScheme,
            Self::V2 => &GeneralizedScheme,
        }
    }
}

impl fmt::Display for SchemeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "v1"),
            Self::V2 => write!(f, "v2"),
        }
    }
}

/// Who is asking: the party whose entries a query or selection concerns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    /// A public key.
    Key(PublicKey),
    /// An address hash (no public key known).
    Address(Address),
    /// A threshold group.
    Threshold {
        /// Required signatures.
        m: u8,
        /// Member keys in declaration order.
        keys: Vec<PublicKey>,
    },
}

impl Identity {
    /// Rejects identities that cannot map to any lookup key.
    pub fn validate(&self) -> Result<()> {
        if let Self::Threshold { m, keys } = self {
            SpendCondition::Threshold { m: *m, keys: keys.clone() }
                .validate()
                .map_err(|e| CoreError::invalid_identity(e.to_string()))?;
        }
        Ok(())
    }

    /// The condition change returned to this identity is locked with.
    #[must_use]
    pub fn change_condition(&self) -> SpendCondition {
        match self {
            Self::Key(pk) => SpendCondition::SingleKey(*pk),
            Self::Address(addr) => SpendCondition::AddressHash(*addr),
            Self::Threshold { m, keys } => SpendCondition::Threshold { m: *m, keys: keys.clone() },
        }
    }
}

impl From<PublicKey> for Identity {
    fn from(pk: PublicKey) -> Self {
        Self::Key(pk)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(pk) => write!(f, "{pk}"),
            Self::Address(addr) => write!(f, "{addr}"),
            Self::Threshold { m, keys } => write!(f, "{m}-of-{}", keys.len()),
        }
    }
}

/// Per-version behaviour.
pub trait TokenScheme: Send + Sync {
    /// Version tag.
    fn version(&self) -> SchemeVersion;

    /// Namespace byte for token entries under this scheme.
    fn eval_identifier(&self) -> u8;

    /// Namespace byte for order entries under this scheme.
    fn market_identifier(&self) -> u8;

    /// Whether entries under this scheme may be locked by `condition`.
    fn supports(&self, condition: &SpendCondition) -> bool;

    /// Every condition under which tokens owned by `identity` may be locked.
    fn conditions_for(&self, identity: &Identity) -> Vec<SpendCondition>;

    /// Condition locking an order entry owned by `owner`.
    fn order_condition(&self, owner: &PublicKey) -> SpendCondition;

    /// Label the shared market keypair is derived from.
    fn market_label(&self) -> &'static str;

    /// Lookup keys for token entries of `identity`.
    fn derive_index_keys(&self, identity: &Identity) -> Result<Vec<IndexKey>> {
        identity.validate()?;
        Ok(self
            .conditions_for(identity)
            .iter()
            .map(|c| self.token_index_key(c))
            .collect())
    }

    /// Lookup key for a token entry locked by `condition`.
    fn token_index_key(&self, condition: &SpendCondition) -> IndexKey {
        IndexKey::derive(self.eval_identifier(), condition)
    }

    /// Builds an M-of-N condition; 1-of-1 collapses to a single key.
    fn build_condition(&self, m: u8, keys: Vec<PublicKey>) -> Result<SpendCondition> {
        let condition = match keys.as_slice() {
            [only] if m == 1 => SpendCondition::SingleKey(*only),
            _ => SpendCondition::threshold(m, keys)?,
        };
        self.ensure_supported(&condition)?;
        Ok(condition)
    }

    /// Fails with `NotSupported` if `condition` cannot be used under this scheme.
    fn ensure_supported(&self, condition: &SpendCondition) -> Result<()> {
        condition.validate()?;
        if self.supports(condition) {
            Ok(())
        } else {
            Err(CoreError::not_supported(format!(
                "{condition} destinations under scheme {}",
                self.version()
            )))
        }
    }

    /// The shared market keypair. Its secret is derivable by anyone.
    fn market_keypair(&self) -> Keypair {
        Keypair::derive_from(self.market_label())
    }

    /// Lookup key under which every order entry of this scheme is filed.
    fn market_index_key(&self) -> IndexKey {
        IndexKey::derive(
            self.market_identifier(),
            &SpendCondition::SingleKey(self.market_keypair().public_key()),
        )
    }

    /// Lookup key under which token creation entries of this scheme are filed.
    fn registry_index_key(&self) -> IndexKey {
        IndexKey::derive(
            self.market_identifier(),
            &SpendCondition::AddressHash(self.market_keypair().public_key().address()),
        )
    }
}

/// Legacy scheme: single-key locks only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyScheme;

impl TokenScheme for LegacyScheme {
    fn version(&self) -> SchemeVersion {
        SchemeVersion::V1
    }

    fn eval_identifier(&self) -> u8 {
        0xf2
    }

    fn market_identifier(&self) -> u8 {
        0xe3
    }

    fn supports(&self, condition: &SpendCondition) -> bool {
        matches!(condition, SpendCondition::SingleKey(_))
    }

    fn conditions_for(&self, identity: &Identity) -> Vec<SpendCondition> {
        match identity {
            Identity::Key(pk) => vec![SpendCondition::SingleKey(*pk)],
            Identity::Address(_) | Identity::Threshold { .. } => Vec::new(),
        }
    }

    // Orders are locked to the market key; owner-cancel is proven by the
    // owner funding the cancel fee.
    fn order_condition(&self, _owner: &PublicKey) -> SpendCondition {
        SpendCondition::SingleKey(self.market_keypair().public_key())
    }

    fn market_label(&self) -> &'static str {
        "utxo-market-v1"
    }
}

/// Generalized scheme: single key, address hash and M-of-N locks.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralizedScheme;

impl TokenScheme for GeneralizedScheme {
    fn version(&self) -> SchemeVersion {
        SchemeVersion::V2
    }

    fn eval_identifier(&self) -> u8 {
        0xf5
    }

    fn market_identifier(&self) -> u8 {
        0xf6
    }

    fn supports(&self, _condition: &SpendCondition) -> bool {
        true
    }

    fn conditions_for(&self, identity: &Identity) -> Vec<SpendCondition> {
        match identity {
            Identity::Key(pk) => vec![
                SpendCondition::SingleKey(*pk),
                SpendCondition::AddressHash(pk.address()),
            ],
            Identity::Address(addr) => vec![SpendCondition::AddressHash(*addr)],
            Identity::Threshold { .. } => vec![identity.change_condition()],
        }
    }

    fn order_condition(&self, owner: &PublicKey) -> SpendCondition {
        SpendCondition::Threshold {
            m: 1,
            keys: vec![*owner, self.market_keypair().public_key()],
        }
    }

    fn market_label(&self) -> &'static str {
        "utxo-market-v2"
    }
}
