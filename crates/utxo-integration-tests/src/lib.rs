//! Integration test support for the token workspace.
//!
//! This crate exists to run tests that span several crates. The helpers
//! below are shared by the files under `tests/`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use tracing_subscriber::EnvFilter;
use utxo_core::{Identity, Keypair, PublicKey, SpendCondition};
use utxo_tx::{Probe, Result};

/// Installs a test-friendly subscriber once; later calls are no-ops.
///
/// Honours `RUST_LOG`, defaulting to `warn`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A single-key participant.
#[derive(Debug)]
pub struct Party {
    /// Signing key.
    pub keypair: Keypair,
}

impl Party {
    /// Deterministic party from a one-byte seed.
    #[must_use]
    pub fn new(seed: u8) -> Self {
        Self {
            keypair: Keypair::from_seed(&[seed; 32]),
        }
    }

    /// Public key.
    #[must_use]
    pub fn pk(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Identity for balance queries and transfers.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::Key(self.pk())
    }

    /// Single-key lock.
    #[must_use]
    pub fn lock(&self) -> SpendCondition {
        SpendCondition::SingleKey(self.pk())
    }

    /// Probes for every scheme, with signing material.
    pub fn probes(&self) -> Result<Vec<Probe>> {
        Probe::for_identity(&self.identity(), &self.keypair)
    }
}
