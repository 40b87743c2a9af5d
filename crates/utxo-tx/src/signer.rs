//! Signature collection and threshold enforcement.

use tracing::debug;
use utxo_core::{KeyCustody, PublicKey, SignatureFragment, SpendCondition, Transaction};

use crate::probe::{tally, Probe};
use crate::signed::{FinalizeOutcome, MissingSignatures, PartiallySignedTx, SignedTx};

/// Produces signature fragments for staged inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Signer;

impl Signer {
    /// Signs every input whose probe carries signing material.
    ///
    /// `probes[i]` belongs to input `i`. Inputs left short of their
    /// condition's threshold make the outcome partial.
    #[must_use]
    pub fn sign(tx: Transaction, probes: &[Probe], custody: &dyn KeyCustody) -> FinalizeOutcome {
        let mut witnesses = vec![Vec::new(); tx.inputs.len()];
        for (index, witness) in witnesses.iter_mut().enumerate() {
            let Some(material) = probes.get(index).and_then(Probe::signing_material) else {
                continue;
            };
            let condition = &tx.inputs[index].condition;
            contribute(&tx, index, condition, material.keys(), custody, witness);
        }
        Self::assemble(tx, witnesses)
    }

    /// Adds signatures from `custody` to a partially signed transaction.
    #[must_use]
    pub fn cosign(partial: PartiallySignedTx, custody: &dyn KeyCustody) -> FinalizeOutcome {
        let PartiallySignedTx { tx, mut witnesses, .. } = partial;
        witnesses.resize(tx.inputs.len(), Vec::new());
        let available = custody.public_keys();
        for (index, witness) in witnesses.iter_mut().enumerate() {
            let condition = &tx.inputs[index].condition;
            contribute(&tx, index, condition, &available, custody, witness);
        }
        Self::assemble(tx, witnesses)
    }

    fn assemble(tx: Transaction, witnesses: Vec<Vec<SignatureFragment>>) -> FinalizeOutcome {
        let missing: Vec<MissingSignatures> = tx
            .inputs
            .iter()
            .enumerate()
            .filter_map(|(index, input)| {
                let t = tally(&input.condition, &tx.sighash(index), &witnesses[index]);
                (!t.is_satisfied()).then_some(MissingSignatures {
                    input: index,
                    required: t.required,
                    have: t.valid,
                })
            })
            .collect();

        if missing.is_empty() {
            FinalizeOutcome::Signed(SignedTx { tx, witnesses })
        } else {
            debug!(
                txid = %tx.txid(),
                unsatisfied = missing.len(),
                "transaction awaits co-signers"
            );
            FinalizeOutcome::PartiallySigned(PartiallySignedTx {
                tx,
                witnesses,
                missing,
            })
        }
    }
}

/// Appends fragments from `keys` until the input's condition is met.
fn contribute(
    tx: &Transaction,
    index: usize,
    condition: &SpendCondition,
    keys: &[PublicKey],
    custody: &dyn KeyCustody,
    witness: &mut Vec<SignatureFragment>,
) {
    let sighash = tx.sighash(index);
    for key in keys {
        if tally(condition, &sighash, witness).is_satisfied() {
            break;
        }
        if !condition.authorizes(key) || witness.iter().any(|f| f.pubkey == *key) {
            continue;
        }
        if let Some(signature) = custody.sign_fragment(key, &sighash) {
            witness.push(SignatureFragment {
                pubkey: *key,
                signature,
            });
        }
    }
}
