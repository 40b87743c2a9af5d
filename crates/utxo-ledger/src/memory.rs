//! In-memory reference ledger.
//!
//! Holds entries and the key index behind a `parking_lot` lock. It performs
//! the checks a node would apply at relay time (known inputs, no double
//! spends, value and token balance, witness thresholds) but no script
//! execution.

use std::collections::{BTreeSet, HashMap, HashSet};

use parking_lot::RwLock;
use tracing::{debug, info};
use utxo_core::{
    Amount, Asset, EntryPayload, IndexKey, LedgerEntry, OutPoint, SchemeVersion,
    SignatureFragment, SpendCondition, TokenId, TokenMeta, Transaction, TxId, TxOutput,
};

use crate::error::{LedgerError, Result};
use crate::view::{Broadcaster, LedgerView};

#[derive(Debug, Default)]
struct LedgerState {
    entries: HashMap<OutPoint, LedgerEntry>,
    index: HashMap<IndexKey, BTreeSet<OutPoint>>,
    height: u32,
    funding_nonce: u64,
    transactions: u64,
}

impl LedgerState {
    fn insert_outputs(&mut self, txid: TxId, outputs: &[TxOutput]) {
        for (vout, output) in outputs.iter().enumerate() {
            let outpoint = OutPoint::new(txid, vout as u32);
            let token = match output.asset {
                Asset::Plain => None,
                Asset::Token(id) => Some(id),
                Asset::Created => Some(TokenId::from(txid)),
            };
            let entry = LedgerEntry {
                outpoint,
                value: output.value,
                token,
                condition: output.condition.clone(),
                scheme: output.scheme,
                payload: output.payload.clone(),
                height: self.height,
                spent: false,
            };
            for key in entry.index_keys() {
                self.index.entry(key).or_default().insert(outpoint);
            }
            self.entries.insert(outpoint, entry);
        }
    }

    fn next_funding_txid(&mut self) -> TxId {
        self.funding_nonce += 1;
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"utxo-ledger-funding");
        hasher.update(&self.funding_nonce.to_le_bytes());
        TxId::from_bytes(*hasher.finalize().as_bytes())
    }
}

/// Reference ledger for development and tests.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    /// Creates an empty ledger at height 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty ledger at `height`.
    #[must_use]
    pub fn at_height(height: u32) -> Self {
        let ledger = Self::new();
        ledger.set_height(height);
        ledger
    }

    /// Sets the chain height.
    pub fn set_height(&self, height: u32) {
        self.state.write().height = height;
    }

    /// Advances the chain height by `blocks`.
    pub fn advance(&self, blocks: u32) -> u32 {
        let mut state = self.state.write();
        state.height = state.height.saturating_add(blocks);
        state.height
    }

    /// Number of transactions accepted through [`Broadcaster::broadcast`].
    #[must_use]
    pub fn transaction_count(&self) -> u64 {
        self.state.read().transactions
    }

    /// Creates an entry out of thin air, as a coinbase would.
    pub fn fund(&self, output: TxOutput) -> Result<OutPoint> {
        output.scheme.scheme().ensure_supported(&output.condition)?;
        let mut state = self.state.write();
        let txid = state.next_funding_txid();
        state.insert_outputs(txid, std::slice::from_ref(&output));
        debug!(txid = %txid, value = %output.value, "funded entry");
        Ok(OutPoint::new(txid, 0))
    }

    /// Funds a plain-value entry under the generalized scheme.
    pub fn fund_plain(&self, value: Amount, condition: SpendCondition) -> Result<OutPoint> {
        self.fund(TxOutput::plain(value, condition, SchemeVersion::V2))
    }

    /// Funds a token entry under `scheme`.
    pub fn fund_token(
        &self,
        token: TokenId,
        value: Amount,
        condition: SpendCondition,
        scheme: SchemeVersion,
    ) -> Result<OutPoint> {
        self.fund(TxOutput::token(token, value, condition, scheme))
    }

    /// Issues a new token class holding its whole supply under `owner`.
    pub fn issue_token(
        &self,
        meta: TokenMeta,
        owner: SpendCondition,
        scheme: SchemeVersion,
    ) -> Result<TokenId> {
        meta.validate()?;
        let output = TxOutput {
            value: meta.supply,
            asset: Asset::Created,
            condition: owner,
            scheme,
            payload: EntryPayload::TokenCreation(meta),
        };
        let outpoint = self.fund(output)?;
        Ok(TokenId::from(outpoint.txid))
    }

    /// Validates and applies `tx`, marking its inputs spent.
    pub fn apply(&self, tx: &Transaction, witnesses: &[Vec<SignatureFragment>]) -> Result<TxId> {
        check_witnesses(tx, witnesses)?;
        check_balance(tx)?;
        for output in &tx.outputs {
            output.scheme.scheme().ensure_supported(&output.condition)?;
        }

        let txid = tx.txid();
        let mut state = self.state.write();

        let mut seen = HashSet::new();
        for input in &tx.inputs {
            let entry = state
                .entries
                .get(&input.prevout)
                .ok_or(LedgerError::unknown_input(input.prevout))?;
            if entry.spent || !seen.insert(input.prevout) {
                return Err(LedgerError::double_spend(input.prevout));
            }
            if entry.value != input.value
                || entry.token != input.token
                || entry.condition != input.condition
            {
                return Err(LedgerError::InputMismatch {
                    outpoint: input.prevout,
                });
            }
        }
        for input in &tx.inputs {
            if let Some(entry) = state.entries.get_mut(&input.prevout) {
                entry.spent = true;
            }
        }
        state.insert_outputs(txid, &tx.outputs);
        state.transactions += 1;

        info!(
            txid = %txid,
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            fee = %tx.fee,
            "transaction accepted"
        );
        Ok(txid)
    }
}

fn check_witnesses(tx: &Transaction, witnesses: &[Vec<SignatureFragment>]) -> Result<()> {
    for (index, input) in tx.inputs.iter().enumerate() {
        let sighash = tx.sighash(index);
        let fragments = witnesses.get(index).map_or(&[][..], Vec::as_slice);
        let valid: HashSet<_> = fragments
            .iter()
            .filter(|f| input.condition.authorizes(&f.pubkey))
            .filter(|f| f.pubkey.verify(&sighash, &f.signature).is_ok())
            .map(|f| f.pubkey)
            .collect();
        let required = input.condition.required_signatures();
        if valid.len() < required {
            return Err(LedgerError::Unsatisfied {
                input: index,
                required,
                have: valid.len(),
            });
        }
    }
    Ok(())
}

fn check_balance(tx: &Transaction) -> Result<()> {
    let inputs = tx.input_value()?;
    let outputs = tx.output_value()?;
    if outputs.try_add(tx.fee, "outputs plus fee")? != inputs {
        return Err(LedgerError::Unbalanced {
            inputs,
            outputs,
            fee: tx.fee,
        });
    }

    let token_in = tx.token_inputs()?;
    let token_out = tx.token_outputs()?;
    let tokens: BTreeSet<_> = token_in.keys().chain(token_out.keys()).collect();
    for token in tokens {
        let consumed = token_in.get(token).copied().unwrap_or(Amount::ZERO);
        let produced = token_out.get(token).copied().unwrap_or(Amount::ZERO);
        if consumed != produced {
            return Err(LedgerError::TokenNotConserved {
                token: *token,
                inputs: consumed,
                outputs: produced,
            });
        }
    }
    Ok(())
}

impl LedgerView for MemoryLedger {
    fn lookup_by_key(&self, key: &IndexKey) -> Vec<LedgerEntry> {
        let state = self.state.read();
        state
            .index
            .get(key)
            .map(|outpoints| {
                outpoints
                    .iter()
                    .filter_map(|op| state.entries.get(op).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_unspent(&self, outpoint: &OutPoint) -> bool {
        self.state
            .read()
            .entries
            .get(outpoint)
            .is_some_and(|e| !e.spent)
    }

    fn entry(&self, outpoint: &OutPoint) -> Option<LedgerEntry> {
        self.state.read().entries.get(outpoint).cloned()
    }

    fn height(&self) -> u32 {
        self.state.read().height
    }
}

impl Broadcaster for MemoryLedger {
    fn broadcast(&self, tx: &Transaction, witnesses: &[Vec<SignatureFragment>]) -> Result<TxId> {
        self.apply(tx, witnesses)
    }
}
