//! Condition probes: a spendable condition plus any signing material for it.
//!
//! A probe without signing material is valid. It marks an input that an
//! external co-signer must complete.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utxo_core::{
    Identity, KeyCustody, LedgerEntry, PublicKey, SchemeVersion, Sighash, SignatureFragment,
    SpendCondition,
};

use crate::error::Result;

/// Keys the caller holds that count towards a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningMaterial {
    keys: Vec<PublicKey>,
}

impl SigningMaterial {
    /// The keys, in condition order where the condition declares one.
    #[must_use]
    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }
}

/// A candidate condition with optional signing material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// Condition the probe can be matched against.
    pub condition: SpendCondition,
    /// Scheme the condition is encoded under.
    pub scheme: SchemeVersion,
    signing_material: Option<SigningMaterial>,
}

impl Probe {
    /// Builds a probe for `condition`.
    ///
    /// Signing material is present iff at least one of `available_keys`
    /// counts towards the condition. For a threshold any non-empty subset
    /// suffices; the remainder may come from other parties' probes.
    pub fn build(
        condition: SpendCondition,
        scheme: SchemeVersion,
        available_keys: &[PublicKey],
    ) -> Result<Self> {
        condition.validate()?;
        let mut keys: Vec<PublicKey> = Vec::new();
        for key in available_keys {
            if condition.authorizes(key) && !keys.contains(key) {
                keys.push(*key);
            }
        }
        let signing_material = (!keys.is_empty()).then_some(SigningMaterial { keys });
        Ok(Self {
            condition,
            scheme,
            signing_material,
        })
    }

    /// Probes for every condition `identity` may hold entries under, in
    /// every scheme, with signing material drawn from `custody`.
    pub fn for_identity(identity: &Identity, custody: &dyn KeyCustody) -> Result<Vec<Self>> {
        identity.validate()?;
        let available = custody.public_keys();
        let mut probes = Vec::new();
        for version in SchemeVersion::ALL {
            for condition in version.scheme().conditions_for(identity) {
                probes.push(Self::build(condition, version, &available)?);
            }
        }
        Ok(probes)
    }

    /// Signing material, if the caller controls a matching key.
    #[must_use]
    pub fn signing_material(&self) -> Option<&SigningMaterial> {
        self.signing_material.as_ref()
    }

    /// Whether the caller can contribute at least one signature.
    #[must_use]
    pub fn can_sign(&self) -> bool {
        self.signing_material.is_some()
    }

    /// Whether this probe can unlock `entry`.
    #[must_use]
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.condition == entry.condition && self.scheme == entry.scheme
    }

    /// Whether `fragments` satisfy this probe's condition over `sighash`.
    #[must_use]
    pub fn satisfies(&self, sighash: &Sighash, fragments: &[SignatureFragment]) -> bool {
        tally(&self.condition, sighash, fragments).is_satisfied()
    }
}

/// Valid signatures counted against a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureTally {
    /// Distinct authorized keys with a valid signature.
    pub valid: usize,
    /// Signatures the condition needs.
    pub required: usize,
}

impl SignatureTally {
    /// Whether the condition is met.
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        self.valid >= self.required
    }

    /// Signatures still missing.
    #[must_use]
    pub const fn missing(&self) -> usize {
        self.required.saturating_sub(self.valid)
    }
}

/// Counts distinct authorized keys whose signature over `sighash` verifies.
///
/// Single-key and address-hash conditions need exactly one; a threshold
/// needs `m` from its declared keys.
#[must_use]
pub fn tally(
    condition: &SpendCondition,
    sighash: &Sighash,
    fragments: &[SignatureFragment],
) -> SignatureTally {
    let valid: BTreeSet<PublicKey> = fragments
        .iter()
        .filter(|f| condition.authorizes(&f.pubkey))
        .filter(|f| f.pubkey.verify(sighash, &f.signature).is_ok())
        .map(|f| f.pubkey)
        .collect();
    SignatureTally {
        valid: valid.len(),
        required: condition.required_signatures(),
    }
}
