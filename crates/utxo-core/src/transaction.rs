//! Transaction wire types and signature digests.
//!
//! Token units are carried in output values like base units, so the value
//! equation `inputs = outputs + fee` is checked over every output, and token
//! conservation is checked per token on top of it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::condition::SpendCondition;
use crate::entry::{Asset, EntryPayload, LedgerEntry};
use crate::error::Result;
use crate::ids::{OutPoint, TokenId, TxId};
use crate::keys::{PublicKey, Sighash, Signature};
use crate::scheme::SchemeVersion;

/// A spend of an existing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Entry being consumed.
    pub prevout: OutPoint,
    /// Value of the consumed entry.
    pub value: Amount,
    /// Token class of the consumed entry.
    pub token: Option<TokenId>,
    /// Lock that must be satisfied.
    pub condition: SpendCondition,
    /// Encoding of that lock.
    pub scheme: SchemeVersion,
}

impl From<&LedgerEntry> for TxInput {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            prevout: entry.outpoint,
            value: entry.value,
            token: entry.token,
            condition: entry.condition.clone(),
            scheme: entry.scheme,
        }
    }
}

/// A new entry created by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Units locked.
    pub value: Amount,
    /// What the units are.
    pub asset: Asset,
    /// Lock.
    pub condition: SpendCondition,
    /// Encoding of the lock.
    pub scheme: SchemeVersion,
    /// Auxiliary payload.
    pub payload: EntryPayload,
}

impl TxOutput {
    /// Plain-value output.
    #[must_use]
    pub fn plain(value: Amount, condition: SpendCondition, scheme: SchemeVersion) -> Self {
        Self {
            value,
            asset: Asset::Plain,
            condition,
            scheme,
            payload: EntryPayload::None,
        }
    }

    /// Token output.
    #[must_use]
    pub fn token(
        token: TokenId,
        value: Amount,
        condition: SpendCondition,
        scheme: SchemeVersion,
    ) -> Self {
        Self {
            value,
            asset: Asset::Token(token),
            condition,
            scheme,
            payload: EntryPayload::None,
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: EntryPayload) -> Self {
        self.payload = payload;
        self
    }
}

/// An unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Spent entries.
    pub inputs: Vec<TxInput>,
    /// Created entries.
    pub outputs: Vec<TxOutput>,
    /// Value left to the ledger.
    pub fee: Amount,
}

impl Transaction {
    /// Hash of the canonical encoding.
    #[must_use]
    pub fn txid(&self) -> TxId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"utxo-tx");
        hasher.update(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            hasher.update(input.prevout.txid.as_bytes());
            hasher.update(&input.prevout.vout.to_le_bytes());
        }
        hasher.update(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            hasher.update(&output.value.units().to_le_bytes());
            match output.asset {
                Asset::Plain => hasher.update(&[0]),
                Asset::Token(id) => hasher.update(&[1]).update(id.as_bytes()),
                Asset::Created => hasher.update(&[2]),
            };
            hasher.update(&output.condition.canonical_bytes());
            hasher.update(&[scheme_byte(output.scheme)]);
            let payload = output.payload.canonical_bytes();
            hasher.update(&(payload.len() as u64).to_le_bytes());
            hasher.update(&payload);
        }
        hasher.update(&self.fee.units().to_le_bytes());
        TxId::from_bytes(*hasher.finalize().as_bytes())
    }

    /// Digest signed by the keys satisfying input `index`.
    #[must_use]
    pub fn sighash(&self, index: usize) -> Sighash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"utxo-sighash");
        hasher.update(self.txid().as_bytes());
        hasher.update(&(index as u32).to_le_bytes());
        if let Some(input) = self.inputs.get(index) {
            hasher.update(&input.value.units().to_le_bytes());
            hasher.update(&input.condition.canonical_bytes());
        }
        Sighash(*hasher.finalize().as_bytes())
    }

    /// Sum of all input values.
    pub fn input_value(&self) -> Result<Amount> {
        Amount::try_sum(self.inputs.iter().map(|i| i.value), "input value")
    }

    /// Sum of all output values.
    pub fn output_value(&self) -> Result<Amount> {
        Amount::try_sum(self.outputs.iter().map(|o| o.value), "output value")
    }

    /// Per-token input totals.
    pub fn token_inputs(&self) -> Result<BTreeMap<TokenId, Amount>> {
        tally(self.inputs.iter().filter_map(|i| i.token.map(|t| (t, i.value))))
    }

    /// Per-token output totals for existing tokens (created units excluded).
    pub fn token_outputs(&self) -> Result<BTreeMap<TokenId, Amount>> {
        tally(self.outputs.iter().filter_map(|o| match o.asset {
            Asset::Token(t) => Some((t, o.value)),
            Asset::Plain | Asset::Created => None,
        }))
    }

    /// Whether any output mints a new token.
    #[must_use]
    pub fn creates_token(&self) -> bool {
        self.outputs.iter().any(|o| o.asset == Asset::Created)
    }
}

fn tally<I>(items: I) -> Result<BTreeMap<TokenId, Amount>>
where
    I: Iterator<Item = (TokenId, Amount)>,
{
    let mut totals = BTreeMap::new();
    for (token, value) in items {
        let slot = totals.entry(token).or_insert(Amount::ZERO);
        *slot = slot.try_add(value, "token total")?;
    }
    Ok(totals)
}

const fn scheme_byte(scheme: SchemeVersion) -> u8 {
    match scheme {
        SchemeVersion::V1 => 1,
        SchemeVersion::V2 => 2,
    }
}

/// One signature contributed towards an input's condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureFragment {
    /// Signing key.
    pub pubkey: PublicKey,
    /// Signature over the input's sighash.
    pub signature: Signature,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Keypair;

    fn cond(seed: u8) -> SpendCondition {
        SpendCondition::SingleKey(Keypair::from_seed(&[seed; 32]).public_key())
    }

    fn sample() -> Transaction {
        let token = TokenId::from_bytes([4; 32]);
        Transaction {
            inputs: vec![TxInput {
                prevout: OutPoint::new(TxId::from_bytes([1; 32]), 0),
                value: Amount::from_units(50),
                token: Some(token),
                condition: cond(1),
                scheme: SchemeVersion::V2,
            }],
            outputs: vec![
                TxOutput::token(token, Amount::from_units(20), cond(2), SchemeVersion::V2),
                TxOutput::token(token, Amount::from_units(30), cond(1), SchemeVersion::V2),
            ],
            fee: Amount::ZERO,
        }
    }

    #[test]
    fn txid_changes_with_outputs() {
        let a = sample();
        let mut b = sample();
        b.outputs[0].value = Amount::from_units(21);
        assert_eq!(a.txid(), sample().txid());
        assert_ne!(a.txid(), b.txid());
    }

    #[test]
    fn sighash_is_per_input() {
        let tx = sample();
        assert_ne!(tx.sighash(0), tx.sighash(1));
    }

    #[test]
    fn token_totals_balance() {
        let tx = sample();
        assert_eq!(tx.token_inputs().unwrap(), tx.token_outputs().unwrap());
        assert_eq!(tx.input_value().unwrap(), tx.output_value().unwrap());
        assert!(!tx.creates_token());
    }

    #[test]
    fn payload_is_committed() {
        let marked = |units| {
            let mut tx = sample();
            tx.outputs[1] = tx.outputs[1].clone().with_payload(EntryPayload::Cancellation(
                crate::entry::OrderCancellation {
                    order_id: TxId::from_bytes([8; 32]),
                    remaining: Amount::from_units(units),
                },
            ));
            tx
        };
        assert_ne!(sample().txid(), marked(30).txid());
        assert_ne!(marked(30).txid(), marked(31).txid());
        assert_eq!(marked(30).txid(), marked(30).txid());
    }

    #[test]
    fn scheme_is_committed() {
        let a = sample();
        let mut b = sample();
        b.outputs[1].scheme = SchemeVersion::V1;
        assert_ne!(a.txid(), b.txid());
    }
}
