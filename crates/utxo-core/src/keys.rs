//! Ed25519 keys, address hashes and the key-custody boundary.
//!
//! Private material lives behind [`KeyCustody`]. Callers hand a custody
//! implementation to the finalizer for the duration of one call; nothing in
//! the core stores signing keys beyond that.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// An Ed25519 keypair.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

/// A public key, used in spending conditions and for verification.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(VerifyingKey);

/// An Ed25519 signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(DalekSignature);

/// The 32-byte digest a signature commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sighash(pub [u8; 32]);

/// A 20-byte hash of a public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Keypair {
    /// Generates a new random keypair.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Creates a keypair from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Deterministically derives a keypair from a label.
    ///
    /// The derived secret is public knowledge; use only for keys whose
    /// signing authority is meant to be shared (e.g. the market key).
    #[must_use]
    pub fn derive_from(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"utxo-keypair-derivation");
        hasher.update(label.as_bytes());
        Self::from_seed(hasher.finalize().as_bytes())
    }

    /// Returns the public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key())
    }

    /// Signs a digest.
    #[must_use]
    pub fn sign(&self, sighash: &Sighash) -> Signature {
        Signature(self.signing_key.sign(&sighash.0))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl PublicKey {
    /// Returns the raw bytes of the public key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Creates a public key from raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        VerifyingKey::from_bytes(bytes)
            .map(PublicKey)
            .map_err(|e| CoreError::Crypto(e.to_string()))
    }

    /// Returns the address hash of this key.
    #[must_use]
    pub fn address(&self) -> Address {
        Address::of(self)
    }

    /// Verifies a signature over a digest.
    ///
    /// Uses strict verification so that malleated signatures are rejected.
    pub fn verify(&self, sighash: &Sighash, signature: &Signature) -> Result<()> {
        self.0
            .verify_strict(&sighash.0, &signature.0)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &hex::encode(self.as_bytes())[..16])
    }
}

impl Signature {
    /// Returns the raw bytes of the signature.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }

    /// Creates a signature from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self(DalekSignature::from_bytes(bytes))
    }
}

impl Address {
    /// Hashes a public key into an address: the first 20 bytes of SHA-256.
    #[must_use]
    pub fn of(key: &PublicKey) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| CoreError::invalid_identity(format!("bad address encoding: {e}")))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| CoreError::invalid_identity("address must be 20 bytes"))?;
        Ok(Self(bytes))
    }
}

/// Source of signing authority for keys the caller controls.
pub trait KeyCustody {
    /// Public keys this custody can sign for.
    fn public_keys(&self) -> Vec<PublicKey>;

    /// Whether this custody controls `key`.
    fn controls(&self, key: &PublicKey) -> bool {
        self.public_keys().contains(key)
    }

    /// Produces a signature fragment, or `None` if `key` is not controlled.
    fn sign_fragment(&self, key: &PublicKey, sighash: &Sighash) -> Option<Signature>;
}

impl KeyCustody for Keypair {
    fn public_keys(&self) -> Vec<PublicKey> {
        vec![self.public_key()]
    }

    fn sign_fragment(&self, key: &PublicKey, sighash: &Sighash) -> Option<Signature> {
        (*key == self.public_key()).then(|| self.sign(sighash))
    }
}

/// An in-memory set of keypairs.
#[derive(Debug, Default)]
pub struct Keyring {
    keys: BTreeMap<PublicKey, Keypair>,
}

impl Keyring {
    /// Creates an empty keyring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a keypair, returning its public key.
    pub fn insert(&mut self, keypair: Keypair) -> PublicKey {
        let pk = keypair.public_key();
        self.keys.insert(pk, keypair);
        pk
    }

    /// Number of keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no keys are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<Keypair> for Keyring {
    fn from_iter<I: IntoIterator<Item = Keypair>>(iter: I) -> Self {
        let mut ring = Self::new();
        for kp in iter {
            ring.insert(kp);
        }
        ring
    }
}

impl KeyCustody for Keyring {
    fn public_keys(&self) -> Vec<PublicKey> {
        self.keys.keys().copied().collect()
    }

    fn controls(&self, key: &PublicKey) -> bool {
        self.keys.contains_key(key)
    }

    fn sign_fragment(&self, key: &PublicKey, sighash: &Sighash) -> Option<Signature> {
        self.keys.get(key).map(|kp| kp.sign(sighash))
    }
}

/// Two custodies consulted in order.
pub struct CustodyChain<'a> {
    primary: &'a dyn KeyCustody,
    secondary: &'a dyn KeyCustody,
}

impl<'a> CustodyChain<'a> {
    /// Chains `secondary` behind `primary`.
    #[must_use]
    pub fn new(primary: &'a dyn KeyCustody, secondary: &'a dyn KeyCustody) -> Self {
        Self { primary, secondary }
    }
}

impl KeyCustody for CustodyChain<'_> {
    fn public_keys(&self) -> Vec<PublicKey> {
        let mut keys = self.primary.public_keys();
        for pk in self.secondary.public_keys() {
            if !keys.contains(&pk) {
                keys.push(pk);
            }
        }
        keys
    }

    fn controls(&self, key: &PublicKey) -> bool {
        self.primary.controls(key) || self.secondary.controls(key)
    }

    fn sign_fragment(&self, key: &PublicKey, sighash: &Sighash) -> Option<Signature> {
        self.primary
            .sign_fragment(key, sighash)
            .or_else(|| self.secondary.sign_fragment(key, sighash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(byte: u8) -> Sighash {
        Sighash([byte; 32])
    }

    #[test]
    fn sign_and_verify() {
        let kp = Keypair::generate();
        let sig = kp.sign(&digest(1));
        assert!(kp.public_key().verify(&digest(1), &sig).is_ok());
        assert!(kp.public_key().verify(&digest(2), &sig).is_err());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let sig = a.sign(&digest(7));
        assert!(b.public_key().verify(&digest(7), &sig).is_err());
    }

    #[test]
    fn derive_from_is_deterministic() {
        let a = Keypair::derive_from("market");
        let b = Keypair::derive_from("market");
        let c = Keypair::derive_from("other");
        assert_eq!(a.public_key(), b.public_key());
        assert_ne!(a.public_key(), c.public_key());
    }

    #[test]
    fn address_roundtrips_through_base58() {
        let pk = Keypair::from_seed(&[3; 32]).public_key();
        let addr = pk.address();
        let parsed: Address = addr.to_string().parse().unwrap();
        assert_eq!(addr, parsed);
        assert!("not-base58-0OIl".parse::<Address>().is_err());
    }

    #[test]
    fn public_key_bytes_roundtrip() {
        let pk = Keypair::generate().public_key();
        assert_eq!(PublicKey::from_bytes(pk.as_bytes()).unwrap(), pk);
    }

    #[test]
    fn keyring_signs_only_for_held_keys() {
        let held = Keypair::from_seed(&[1; 32]);
        let held_pk = held.public_key();
        let stranger = Keypair::from_seed(&[2; 32]).public_key();
        let ring: Keyring = [held].into_iter().collect();

        assert!(ring.controls(&held_pk));
        assert!(!ring.controls(&stranger));
        assert!(ring.sign_fragment(&held_pk, &digest(0)).is_some());
        assert!(ring.sign_fragment(&stranger, &digest(0)).is_none());
    }

    #[test]
    fn custody_chain_falls_through() {
        let a = Keypair::from_seed(&[1; 32]);
        let b = Keypair::from_seed(&[2; 32]);
        let chain = CustodyChain::new(&a, &b);
        assert_eq!(chain.public_keys().len(), 2);
        assert!(chain.sign_fragment(&b.public_key(), &digest(4)).is_some());
    }

    #[test]
    fn signature_bytes_roundtrip() {
        let kp = Keypair::generate();
        let sig = kp.sign(&digest(9));
        assert_eq!(Signature::from_bytes(&sig.to_bytes()), sig);
    }
}
