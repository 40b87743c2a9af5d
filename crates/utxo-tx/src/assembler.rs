//! Staged, multi-step transaction assembly.
//!
//! A [`TxAssembler`] moves through `Idle → Staging → {Finalized, Aborted}`.
//! Transfers for any number of tokens accumulate into one staged transaction
//! that shares a single fee envelope. Any failing `add_*` call aborts the
//! whole staged transaction; nothing partial is ever handed back.
//!
//! Inputs are reserved only in memory. [`TxAssembler::finalize`] re-checks
//! that each selected input is still unspent and fails with
//! [`TxError::StaleInput`] if another builder got there first.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use tracing::{debug, error, info, warn};
use utxo_core::{
    Amount, Asset, EntryPayload, Identity, IndexKey, KeyCustody, LedgerEntry, OutPoint,
    SpendCondition, TokenId, TokenMeta, Transaction, TxInput, TxOutput,
};
use utxo_ledger::{BalanceIndex, LedgerView};

use crate::config::AssemblerConfig;
use crate::error::{Result, TxError};
use crate::probe::Probe;
use crate::selection::{select_largest_first, Selection};
use crate::signed::FinalizeOutcome;
use crate::signer::Signer;

/// Lifecycle state of a staged transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssemblerState {
    /// Nothing staged.
    #[default]
    Idle,
    /// Accepting inputs and outputs.
    Staging,
    /// A transaction was produced.
    Finalized,
    /// Staging failed or was discarded.
    Aborted,
}

impl AssemblerState {
    /// Returns true if transitioning to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(&self, target: &Self) -> bool {
        use AssemblerState::{Aborted, Finalized, Idle, Staging};

        matches!(
            (self, target),
            (Idle, Staging) | (Staging, Finalized | Aborted)
        )
    }

    /// Returns true for `Finalized` and `Aborted`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Aborted)
    }
}

impl fmt::Display for AssemblerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Staging => write!(f, "staging"),
            Self::Finalized => write!(f, "finalized"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Builds one transaction against a ledger view.
pub struct TxAssembler<'a, L: LedgerView + ?Sized> {
    ledger: &'a L,
    config: AssemblerConfig,
    state: AssemblerState,
    fee_reserve: Option<Amount>,
    inputs: Vec<(LedgerEntry, Probe)>,
    outputs: Vec<TxOutput>,
}

impl<'a, L: LedgerView + ?Sized> TxAssembler<'a, L> {
    /// Creates an idle assembler.
    #[must_use]
    pub fn new(ledger: &'a L, config: AssemblerConfig) -> Self {
        Self {
            ledger,
            config,
            state: AssemblerState::Idle,
            fee_reserve: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AssemblerState {
        self.state
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Outpoints staged so far.
    #[must_use]
    pub fn staged_inputs(&self) -> Vec<OutPoint> {
        self.inputs.iter().map(|(e, _)| e.outpoint).collect()
    }

    /// Outputs staged so far.
    #[must_use]
    pub fn staged_outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    /// Enters `Staging` with empty inputs and outputs.
    ///
    /// `fee_reserve` overrides the configured default fee.
    pub fn begin(&mut self, fee_reserve: Option<Amount>) -> Result<()> {
        self.transition_to(AssemblerState::Staging)?;
        self.fee_reserve = fee_reserve;
        self.inputs.clear();
        self.outputs.clear();
        debug!(fee_reserve = ?fee_reserve.map(|f| f.units()), "staging started");
        Ok(())
    }

    /// Sends `amount` of `token` in one output locked by `destination`.
    ///
    /// A multi-key destination is a single `Threshold` lock, not one output
    /// per key. Entries are selected largest-first from `sources`, restricted
    /// to those some probe in `probes` matches. Token change goes back to the
    /// first source.
    pub fn add_transfer(
        &mut self,
        token: &TokenId,
        sources: &[Identity],
        destination: &SpendCondition,
        amount: Amount,
        probes: &[Probe],
    ) -> Result<()> {
        let output = TxOutput::token(*token, amount, destination.clone(), self.config.output_scheme);
        self.add_transfer_outputs(token, sources, vec![output], probes)
    }

    /// Like [`add_transfer`](Self::add_transfer) with caller-built outputs.
    ///
    /// Every output must carry `token`; payloads (e.g. order terms) are kept.
    pub fn add_transfer_outputs(
        &mut self,
        token: &TokenId,
        sources: &[Identity],
        outputs: Vec<TxOutput>,
        probes: &[Probe],
    ) -> Result<()> {
        self.guarded(|this| this.stage_transfer(token, sources, outputs, probes))
    }

    /// Selects at least `amount` of `token` held by `identity` without
    /// adding outputs. Returns the value selected; the caller owns change.
    pub fn add_token_inputs(
        &mut self,
        token: &TokenId,
        identity: &Identity,
        amount: Amount,
        probes: &[Probe],
    ) -> Result<Amount> {
        self.guarded(|this| {
            this.require_staging()?;
            if !amount.is_positive() {
                return Err(TxError::invalid_request("amount must be positive"));
            }
            this.select_tokens(token, std::slice::from_ref(identity), amount, probes)
        })
    }

    /// Stages a specific entry as an input.
    pub fn add_input(&mut self, entry: LedgerEntry, probe: Probe) -> Result<()> {
        self.guarded(|this| {
            this.require_staging()?;
            if !probe.matches(&entry) {
                return Err(TxError::invalid_request(format!(
                    "probe does not match the lock of {}",
                    entry.outpoint
                )));
            }
            if this.is_staged(&entry.outpoint) {
                return Err(TxError::invalid_request(format!(
                    "{} already staged",
                    entry.outpoint
                )));
            }
            if entry.spent || !this.ledger.is_unspent(&entry.outpoint) {
                return Err(TxError::StaleInput {
                    outpoint: entry.outpoint,
                });
            }
            this.push_input(entry, probe)
        })
    }

    /// Stages an output.
    pub fn add_output(&mut self, output: TxOutput) -> Result<()> {
        self.guarded(|this| {
            this.require_staging()?;
            if output.asset == Asset::Created {
                return Err(TxError::invalid_request(
                    "created-token outputs are staged through add_token_creation",
                ));
            }
            this.push_output(output)
        })
    }

    /// Stages creation of a new token class held by `owner`.
    ///
    /// The supply is backed by plain value drawn at finalization. The token
    /// id is the id of the finalized transaction.
    pub fn add_token_creation(&mut self, meta: TokenMeta, owner: SpendCondition) -> Result<()> {
        self.guarded(|this| {
            this.require_staging()?;
            meta.validate()?;
            if this.outputs.iter().any(|o| o.asset == Asset::Created) {
                return Err(TxError::invalid_request(
                    "a transaction creates at most one token",
                ));
            }
            let output = TxOutput {
                value: meta.supply,
                asset: Asset::Created,
                condition: owner,
                scheme: this.config.output_scheme,
                payload: EntryPayload::TokenCreation(meta),
            };
            this.push_output(output)
        })
    }

    /// Drops everything staged. No ledger side effects.
    pub fn discard(&mut self) {
        if self.state == AssemblerState::Staging {
            debug!(
                inputs = self.inputs.len(),
                outputs = self.outputs.len(),
                "staged transaction discarded"
            );
            self.abort();
        }
    }

    /// Funds, signs and seals the staged transaction.
    ///
    /// Fee shortfall is covered by plain entries matching `funding`
    /// (largest first). Plain change above the dust threshold goes to
    /// `change`; anything up to the threshold is added to the fee. Fails with
    /// `InsufficientFeeFunds` while keeping the staged transaction so the
    /// caller can retry with more funding.
    pub fn finalize(
        &mut self,
        change: &SpendCondition,
        funding: &[Probe],
        custody: &dyn KeyCustody,
    ) -> Result<FinalizeOutcome> {
        self.require_staging()?;

        if let Err(e) = self.check_conservation() {
            error!(error = %e, "refusing to finalize unbalanced token transfer");
            self.abort();
            return Err(e);
        }
        if let Some(outpoint) = self.first_spent(self.inputs.iter().map(|(e, _)| e)) {
            return Err(self.stale(outpoint));
        }

        let (funding_inputs, fee, change_value) = match self.plan_funding(funding) {
            Ok(plan) => plan,
            Err(e @ TxError::InsufficientFeeFunds { .. }) => return Err(e),
            Err(e) => {
                self.abort();
                return Err(e);
            }
        };

        let mut outputs = self.outputs.clone();
        if let Some(value) = change_value {
            let output = TxOutput::plain(value, change.clone(), self.config.output_scheme);
            if let Err(e) = output.scheme.scheme().ensure_supported(&output.condition) {
                self.abort();
                return Err(e.into());
            }
            outputs.push(output);
        }

        let mut staged = self.inputs.clone();
        staged.extend(funding_inputs);
        let (entries, probes): (Vec<_>, Vec<_>) = staged.into_iter().unzip();
        let tx = Transaction {
            inputs: entries.iter().map(TxInput::from).collect(),
            outputs,
            fee,
        };

        let outcome = Signer::sign(tx, &probes, custody);

        if let Some(outpoint) = self.first_spent(entries.iter()) {
            return Err(self.stale(outpoint));
        }

        self.transition_to(AssemblerState::Finalized)?;
        info!(
            txid = %outcome.txid(),
            inputs = entries.len(),
            fee = %fee,
            signed = outcome.is_signed(),
            "transaction finalized"
        );
        Ok(outcome)
    }

    fn stage_transfer(
        &mut self,
        token: &TokenId,
        sources: &[Identity],
        outputs: Vec<TxOutput>,
        probes: &[Probe],
    ) -> Result<()> {
        self.require_staging()?;
        if token.is_null() {
            return Err(TxError::invalid_request("token id must not be null"));
        }
        if sources.is_empty() {
            return Err(TxError::invalid_request("at least one source identity required"));
        }
        if outputs.is_empty() {
            return Err(TxError::invalid_request("at least one destination required"));
        }
        for output in &outputs {
            if output.asset != Asset::Token(*token) {
                return Err(TxError::invalid_request("transfer outputs must carry the token"));
            }
            if !output.value.is_positive() {
                return Err(TxError::invalid_request("amount must be positive"));
            }
            output.scheme.scheme().ensure_supported(&output.condition)?;
        }
        let required = Amount::try_sum(outputs.iter().map(|o| o.value), "transfer total")?;

        let selected = self.select_tokens(token, sources, required, probes)?;
        for output in outputs {
            self.push_output(output)?;
        }

        if let Some(change) = selected.checked_sub(required).filter(|c| c.is_positive()) {
            let output = TxOutput::token(
                *token,
                change,
                sources[0].change_condition(),
                self.config.output_scheme,
            );
            self.push_output(output)?;
        }
        debug!(
            token = %token,
            required = %required,
            selected = %selected,
            "token transfer staged"
        );
        Ok(())
    }

    fn select_tokens(
        &mut self,
        token: &TokenId,
        sources: &[Identity],
        required: Amount,
        probes: &[Probe],
    ) -> Result<Amount> {
        let index = BalanceIndex::new(self.ledger);
        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();
        for identity in sources {
            for entry in index.token_entries(identity)? {
                if entry.token == Some(*token)
                    && !self.is_staged(&entry.outpoint)
                    && probes.iter().any(|p| p.matches(&entry))
                    && seen.insert(entry.outpoint)
                {
                    candidates.push(entry);
                }
            }
        }

        let room = self.config.max_inputs.saturating_sub(self.inputs.len());
        match select_largest_first(candidates, required, room)? {
            Selection::Covered { entries, total } => {
                for entry in entries {
                    let probe = matching_probe(probes, &entry)?;
                    self.push_input(entry, probe)?;
                }
                Ok(total)
            }
            Selection::Short { available } => Err(TxError::InsufficientTokenFunds {
                token: *token,
                required,
                available,
            }),
        }
    }

    /// Returns the extra funding inputs, the fee, and plain change to pay out.
    fn plan_funding(
        &self,
        funding: &[Probe],
    ) -> Result<(Vec<(LedgerEntry, Probe)>, Amount, Option<Amount>)> {
        let fee = self.fee_reserve.unwrap_or(self.config.default_fee);
        let staged_in = Amount::try_sum(self.inputs.iter().map(|(e, _)| e.value), "input value")?;
        let staged_out = Amount::try_sum(self.outputs.iter().map(|o| o.value), "output value")?;
        let needed = staged_out.try_add(fee, "outputs plus fee")?;

        let mut extra = Vec::new();
        let mut total_in = staged_in;
        if let Some(shortfall) = needed.checked_sub(staged_in).filter(|s| s.is_positive()) {
            let candidates = self.plain_candidates(funding);
            let room = self.config.max_inputs.saturating_sub(self.inputs.len());
            match select_largest_first(candidates, shortfall, room)? {
                Selection::Covered { entries, total } => {
                    for entry in entries {
                        let probe = matching_probe(funding, &entry)?;
                        extra.push((entry, probe));
                    }
                    total_in = total_in.try_add(total, "input value")?;
                }
                Selection::Short { available } => {
                    warn!(shortfall = %shortfall, available = %available, "fee funding short");
                    return Err(TxError::InsufficientFeeFunds {
                        required: shortfall,
                        available,
                    });
                }
            }
        }

        let excess = total_in
            .checked_sub(needed)
            .ok_or(utxo_core::CoreError::overflow("funding excess"))?;
        if excess > self.config.dust_threshold && excess.is_positive() {
            Ok((extra, fee, Some(excess)))
        } else {
            let fee = fee.try_add(excess, "fee plus dust")?;
            Ok((extra, fee, None))
        }
    }

    fn plain_candidates(&self, funding: &[Probe]) -> Vec<LedgerEntry> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for probe in funding {
            for entry in self.ledger.lookup_by_key(&IndexKey::plain(&probe.condition)) {
                if entry.token.is_none()
                    && entry.order_terms().is_none()
                    && !entry.spent
                    && probe.matches(&entry)
                    && !self.is_staged(&entry.outpoint)
                    && self.ledger.is_unspent(&entry.outpoint)
                    && seen.insert(entry.outpoint)
                {
                    candidates.push(entry);
                }
            }
        }
        candidates
    }

    fn check_conservation(&self) -> Result<()> {
        let mut token_in = std::collections::BTreeMap::<TokenId, Amount>::new();
        for (entry, _) in &self.inputs {
            if let Some(token) = entry.token {
                let slot = token_in.entry(token).or_insert(Amount::ZERO);
                *slot = slot.try_add(entry.value, "token inputs")?;
            }
        }
        let mut token_out = std::collections::BTreeMap::<TokenId, Amount>::new();
        for output in &self.outputs {
            if let Asset::Token(token) = output.asset {
                let slot = token_out.entry(token).or_insert(Amount::ZERO);
                *slot = slot.try_add(output.value, "token outputs")?;
            }
        }
        let tokens: BTreeSet<_> = token_in.keys().chain(token_out.keys()).copied().collect();
        for token in tokens {
            let inputs = token_in.get(&token).copied().unwrap_or(Amount::ZERO);
            let outputs = token_out.get(&token).copied().unwrap_or(Amount::ZERO);
            if inputs != outputs {
                return Err(TxError::ConservationViolation {
                    token,
                    inputs,
                    outputs,
                });
            }
        }
        Ok(())
    }

    fn first_spent<'e>(&self, mut entries: impl Iterator<Item = &'e LedgerEntry>) -> Option<OutPoint> {
        entries
            .find(|e| !self.ledger.is_unspent(&e.outpoint))
            .map(|e| e.outpoint)
    }

    fn stale(&mut self, outpoint: OutPoint) -> TxError {
        warn!(outpoint = %outpoint, "selected input spent before finalize");
        self.abort();
        TxError::StaleInput { outpoint }
    }

    fn push_input(&mut self, entry: LedgerEntry, probe: Probe) -> Result<()> {
        if self.inputs.len() >= self.config.max_inputs {
            return Err(TxError::invalid_request(format!(
                "input limit of {} reached",
                self.config.max_inputs
            )));
        }
        self.inputs.push((entry, probe));
        Ok(())
    }

    fn push_output(&mut self, output: TxOutput) -> Result<()> {
        if !output.value.is_positive() {
            return Err(TxError::invalid_request("output value must be positive"));
        }
        output.scheme.scheme().ensure_supported(&output.condition)?;
        self.outputs.push(output);
        Ok(())
    }

    fn is_staged(&self, outpoint: &OutPoint) -> bool {
        self.inputs.iter().any(|(e, _)| e.outpoint == *outpoint)
    }

    fn require_staging(&self) -> Result<()> {
        if self.state == AssemblerState::Staging {
            Ok(())
        } else {
            Err(TxError::InvalidState {
                expected: AssemblerState::Staging,
                found: self.state,
            })
        }
    }

    fn transition_to(&mut self, target: AssemblerState) -> Result<()> {
        if self.state.can_transition_to(&target) {
            self.state = target;
            Ok(())
        } else {
            Err(TxError::InvalidState {
                expected: match target {
                    AssemblerState::Staging => AssemblerState::Idle,
                    _ => AssemblerState::Staging,
                },
                found: self.state,
            })
        }
    }

    fn abort(&mut self) {
        self.state = AssemblerState::Aborted;
        self.inputs.clear();
        self.outputs.clear();
    }

    /// Runs a staging step; any failure aborts the staged transaction.
    fn guarded<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = step(self);
        if let Err(e) = &result {
            if self.state == AssemblerState::Staging {
                debug!(error = %e, "staging step failed, aborting");
                self.abort();
            }
        }
        result
    }
}

fn matching_probe(probes: &[Probe], entry: &LedgerEntry) -> Result<Probe> {
    probes
        .iter()
        .find(|p| p.matches(entry))
        .cloned()
        .ok_or_else(|| TxError::invalid_request(format!("no probe for {}", entry.outpoint)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use utxo_core::{Keypair, PublicKey, SchemeVersion};
    use utxo_ledger::MemoryLedger;

    fn kp(seed: u8) -> Keypair {
        Keypair::from_seed(&[seed; 32])
    }

    fn single(pk: PublicKey) -> SpendCondition {
        SpendCondition::SingleKey(pk)
    }

    fn token() -> TokenId {
        TokenId::from_bytes([0x42; 32])
    }

    fn small_fee_config() -> AssemblerConfig {
        AssemblerConfig::builder()
            .default_fee(Amount::from_units(10))
            .dust_threshold(Amount::from_units(5))
            .build()
    }

    struct Fixture {
        ledger: MemoryLedger,
        alice: Keypair,
        bob: Keypair,
    }

    fn fixture(token_values: &[u32], plain: u32) -> Fixture {
        let ledger = MemoryLedger::new();
        let alice = kp(1);
        let bob = kp(2);
        for v in token_values {
            ledger
                .fund_token(token(), Amount::from_units(*v), single(alice.public_key()), SchemeVersion::V2)
                .unwrap();
        }
        if plain > 0 {
            ledger
                .fund_plain(Amount::from_units(plain), single(alice.public_key()))
                .unwrap();
        }
        Fixture { ledger, alice, bob }
    }

    fn probes(f: &Fixture) -> Vec<Probe> {
        Probe::for_identity(&Identity::Key(f.alice.public_key()), &f.alice).unwrap()
    }

    #[test]
    fn state_transitions() {
        use AssemblerState::{Aborted, Finalized, Idle, Staging};
        assert!(Idle.can_transition_to(&Staging));
        assert!(Staging.can_transition_to(&Finalized));
        assert!(Staging.can_transition_to(&Aborted));
        assert!(!Idle.can_transition_to(&Finalized));
        assert!(!Finalized.can_transition_to(&Staging));
        assert!(!Aborted.can_transition_to(&Staging));
    }

    #[test]
    fn add_before_begin_is_rejected() {
        let f = fixture(&[100], 1_000);
        let mut asm = TxAssembler::new(&f.ledger, small_fee_config());
        let err = asm
            .add_transfer(
                &token(),
                &[Identity::Key(f.alice.public_key())],
                &single(f.bob.public_key()),
                Amount::from_units(10),
                &probes(&f),
            )
            .unwrap_err();
        assert!(matches!(err, TxError::InvalidState { found: AssemblerState::Idle, .. }));
    }

    #[test]
    fn transfer_with_token_change_and_fee_change() {
        let f = fixture(&[60, 50], 1_000);
        let ps = probes(&f);
        let mut asm = TxAssembler::new(&f.ledger, small_fee_config());
        asm.begin(None).unwrap();
        asm.add_transfer(
            &token(),
            &[Identity::Key(f.alice.public_key())],
            &single(f.bob.public_key()),
            Amount::from_units(80),
            &ps,
        )
        .unwrap();

        let signed = asm
            .finalize(&single(f.alice.public_key()), &ps, &f.alice)
            .unwrap()
            .signed()
            .unwrap();
        assert_eq!(asm.state(), AssemblerState::Finalized);

        // Tokens: 110 in, 80 to bob, 30 change. Plain: 1000 in, 10 fee, 990 change.
        let tx = &signed.tx;
        assert_eq!(tx.inputs.len(), 3);
        assert_eq!(tx.token_inputs().unwrap()[&token()], Amount::from_units(110));
        assert_eq!(tx.token_outputs().unwrap()[&token()], Amount::from_units(110));
        assert_eq!(tx.fee, Amount::from_units(10));
        signed.broadcast(&f.ledger).unwrap();

        let index = BalanceIndex::new(&f.ledger);
        assert_eq!(
            index.get_balance(&token(), &Identity::Key(f.bob.public_key())).unwrap(),
            Amount::from_units(80)
        );
        assert_eq!(
            index.get_balance(&token(), &Identity::Key(f.alice.public_key())).unwrap(),
            Amount::from_units(30)
        );
    }

    #[test]
    fn insufficient_tokens_aborts() {
        let f = fixture(&[10], 1_000);
        let ps = probes(&f);
        let mut asm = TxAssembler::new(&f.ledger, small_fee_config());
        asm.begin(None).unwrap();
        let err = asm
            .add_transfer(
                &token(),
                &[Identity::Key(f.alice.public_key())],
                &single(f.bob.public_key()),
                Amount::from_units(11),
                &ps,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            TxError::InsufficientTokenFunds { available, .. } if available == Amount::from_units(10)
        ));
        assert_eq!(asm.state(), AssemblerState::Aborted);
        assert!(asm.staged_inputs().is_empty());
    }

    #[test]
    fn insufficient_fee_keeps_staging_for_top_up() {
        let f = fixture(&[10], 0);
        let ps = probes(&f);
        let mut asm = TxAssembler::new(&f.ledger, small_fee_config());
        asm.begin(None).unwrap();
        asm.add_transfer(
            &token(),
            &[Identity::Key(f.alice.public_key())],
            &single(f.bob.public_key()),
            Amount::from_units(10),
            &ps,
        )
        .unwrap();
        let err = asm
            .finalize(&single(f.alice.public_key()), &ps, &f.alice)
            .unwrap_err();
        assert!(matches!(err, TxError::InsufficientFeeFunds { .. }));
        assert_eq!(asm.state(), AssemblerState::Staging);

        f.ledger
            .fund_plain(Amount::from_units(10), single(f.alice.public_key()))
            .unwrap();
        let outcome = asm
            .finalize(&single(f.alice.public_key()), &ps, &f.alice)
            .unwrap();
        assert!(outcome.is_signed());
    }

    #[test]
    fn dust_change_is_folded_into_fee() {
        let f = fixture(&[10], 13);
        let ps = probes(&f);
        let mut asm = TxAssembler::new(&f.ledger, small_fee_config());
        asm.begin(None).unwrap();
        asm.add_transfer(
            &token(),
            &[Identity::Key(f.alice.public_key())],
            &single(f.bob.public_key()),
            Amount::from_units(10),
            &ps,
        )
        .unwrap();
        let signed = asm
            .finalize(&single(f.alice.public_key()), &ps, &f.alice)
            .unwrap()
            .signed()
            .unwrap();
        // 13 plain in, 10 fee, 3 left is below dust threshold of 5.
        assert_eq!(signed.tx.fee, Amount::from_units(13));
        assert_eq!(signed.tx.outputs.len(), 1);
        signed.broadcast(&f.ledger).unwrap();
    }

    fn fold_or_change(plain: u32) -> Transaction {
        let f = fixture(&[10], plain);
        let ps = probes(&f);
        let mut asm = TxAssembler::new(&f.ledger, small_fee_config());
        asm.begin(None).unwrap();
        asm.add_transfer(
            &token(),
            &[Identity::Key(f.alice.public_key())],
            &single(f.bob.public_key()),
            Amount::from_units(10),
            &ps,
        )
        .unwrap();
        asm.finalize(&single(f.alice.public_key()), &ps, &f.alice)
            .unwrap()
            .signed()
            .unwrap()
            .tx
    }

    #[test]
    fn change_equal_to_dust_threshold_is_folded() {
        // 15 plain in, 10 fee, 5 left equals the threshold.
        let tx = fold_or_change(15);
        assert_eq!(tx.fee, Amount::from_units(15));
        assert_eq!(tx.outputs.len(), 1);
    }

    #[test]
    fn change_above_dust_threshold_is_paid_out() {
        let tx = fold_or_change(16);
        assert_eq!(tx.fee, Amount::from_units(10));
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[1].value, Amount::from_units(6));
        assert_eq!(tx.outputs[1].asset, Asset::Plain);
    }

    #[test]
    fn multi_key_destination_receives_one_output() {
        let f = fixture(&[100], 1_000);
        let carol = kp(3);
        let ps = probes(&f);
        let group =
            SpendCondition::threshold(1, vec![f.bob.public_key(), carol.public_key()]).unwrap();
        let mut asm = TxAssembler::new(&f.ledger, small_fee_config());
        asm.begin(None).unwrap();
        asm.add_transfer(
            &token(),
            &[Identity::Key(f.alice.public_key())],
            &group,
            Amount::from_units(10),
            &ps,
        )
        .unwrap();
        let token_outputs: Vec<_> = asm
            .staged_outputs()
            .iter()
            .map(|o| (o.value, o.condition.clone()))
            .collect();
        assert_eq!(
            token_outputs,
            vec![
                (Amount::from_units(10), group.clone()),
                (Amount::from_units(90), single(f.alice.public_key())),
            ]
        );

        asm.finalize(&single(f.alice.public_key()), &ps, &f.alice)
            .unwrap()
            .signed()
            .unwrap()
            .broadcast(&f.ledger)
            .unwrap();
        let index = BalanceIndex::new(&f.ledger);
        assert_eq!(
            index.get_balance(&token(), &Identity::Key(f.alice.public_key())).unwrap(),
            Amount::from_units(90)
        );
        assert_eq!(
            index
                .get_balance(
                    &token(),
                    &Identity::Threshold {
                        m: 1,
                        keys: vec![f.bob.public_key(), carol.public_key()],
                    },
                )
                .unwrap(),
            Amount::from_units(10)
        );
    }

    #[test]
    fn selected_input_spent_elsewhere_is_stale() {
        let f = fixture(&[50], 1_000);
        let ps = probes(&f);
        let id = [Identity::Key(f.alice.public_key())];
        let dest = single(f.bob.public_key());

        let mut first = TxAssembler::new(&f.ledger, small_fee_config());
        let mut second = TxAssembler::new(&f.ledger, small_fee_config());
        first.begin(None).unwrap();
        second.begin(None).unwrap();
        first.add_transfer(&token(), &id, &dest, Amount::from_units(50), &ps).unwrap();
        second.add_transfer(&token(), &id, &dest, Amount::from_units(50), &ps).unwrap();

        first
            .finalize(&dest, &ps, &f.alice)
            .unwrap()
            .signed()
            .unwrap()
            .broadcast(&f.ledger)
            .unwrap();

        let err = second.finalize(&dest, &ps, &f.alice).unwrap_err();
        assert!(matches!(err, TxError::StaleInput { .. }));
        assert_eq!(second.state(), AssemblerState::Aborted);
    }

    #[test]
    fn multi_token_transfers_share_one_fee() {
        let f = fixture(&[40], 1_000);
        let other = TokenId::from_bytes([0x43; 32]);
        f.ledger
            .fund_token(other, Amount::from_units(70), single(f.alice.public_key()), SchemeVersion::V1)
            .unwrap();
        let ps = probes(&f);
        let id = [Identity::Key(f.alice.public_key())];
        let dest = single(f.bob.public_key());

        let mut asm = TxAssembler::new(&f.ledger, small_fee_config());
        asm.begin(Some(Amount::from_units(25))).unwrap();
        asm.add_transfer(&token(), &id, &dest, Amount::from_units(40), &ps).unwrap();
        asm.add_transfer(&other, &id, &dest, Amount::from_units(20), &ps).unwrap();
        let signed = asm.finalize(&dest, &ps, &f.alice).unwrap().signed().unwrap();
        assert_eq!(signed.tx.fee, Amount::from_units(25));
        signed.broadcast(&f.ledger).unwrap();

        let all = BalanceIndex::new(&f.ledger)
            .all_balances(&Identity::Key(f.bob.public_key()))
            .unwrap();
        assert_eq!(all[&token()], Amount::from_units(40));
        assert_eq!(all[&other], Amount::from_units(20));
    }

    #[test]
    fn legacy_output_scheme_rejects_threshold_destination() {
        let f = fixture(&[40], 1_000);
        let ps = probes(&f);
        let config = AssemblerConfig::builder().output_scheme(SchemeVersion::V1).build();
        let mut asm = TxAssembler::new(&f.ledger, config);
        asm.begin(None).unwrap();
        let dest = SpendCondition::threshold(1, vec![f.alice.public_key(), f.bob.public_key()]).unwrap();
        let err = asm
            .add_transfer(&token(), &[Identity::Key(f.alice.public_key())], &dest, Amount::from_units(5), &ps)
            .unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::NotSupported);
        assert_eq!(asm.state(), AssemblerState::Aborted);
    }

    #[test]
    fn unbalanced_manual_outputs_are_fatal() {
        let f = fixture(&[40], 1_000);
        let mut asm = TxAssembler::new(&f.ledger, small_fee_config());
        asm.begin(None).unwrap();
        asm.add_output(TxOutput::token(
            token(),
            Amount::from_units(5),
            single(f.bob.public_key()),
            SchemeVersion::V2,
        ))
        .unwrap();
        let ps = probes(&f);
        let err = asm.finalize(&single(f.alice.public_key()), &ps, &f.alice).unwrap_err();
        assert!(matches!(err, TxError::ConservationViolation { .. }));
        assert_eq!(err.category(), crate::ErrorCategory::Fatal);
        assert_eq!(asm.state(), AssemblerState::Aborted);
    }

    #[test]
    fn token_creation_is_backed_by_plain_value() {
        let f = fixture(&[], 5_000);
        let ps = probes(&f);
        let mut asm = TxAssembler::new(&f.ledger, small_fee_config());
        asm.begin(None).unwrap();
        asm.add_token_creation(
            TokenMeta {
                name: "SILVER".into(),
                description: String::new(),
                supply: Amount::from_units(1_000),
                creator: f.alice.public_key(),
                data: Vec::new(),
            },
            single(f.alice.public_key()),
        )
        .unwrap();
        let signed = asm
            .finalize(&single(f.alice.public_key()), &ps, &f.alice)
            .unwrap()
            .signed()
            .unwrap();
        let created = signed.created_token().unwrap();
        signed.broadcast(&f.ledger).unwrap();

        let index = BalanceIndex::new(&f.ledger);
        let alice = Identity::Key(f.alice.public_key());
        assert_eq!(index.get_balance(&created, &alice).unwrap(), Amount::from_units(1_000));
        assert_eq!(index.plain_balance(&alice).unwrap(), Amount::from_units(3_990));
    }

    #[test]
    fn add_token_inputs_leaves_change_to_caller() {
        let f = fixture(&[30, 30], 1_000);
        let ps = probes(&f);
        let mut asm = TxAssembler::new(&f.ledger, small_fee_config());
        asm.begin(None).unwrap();
        let got = asm
            .add_token_inputs(&token(), &Identity::Key(f.alice.public_key()), Amount::from_units(40), &ps)
            .unwrap();
        assert_eq!(got, Amount::from_units(60));
        assert_eq!(asm.staged_inputs().len(), 2);
        assert!(asm.staged_outputs().is_empty());
    }

    #[test]
    fn discard_has_no_ledger_effect() {
        let f = fixture(&[30], 1_000);
        let ps = probes(&f);
        let mut asm = TxAssembler::new(&f.ledger, small_fee_config());
        asm.begin(None).unwrap();
        asm.add_transfer(
            &token(),
            &[Identity::Key(f.alice.public_key())],
            &single(f.bob.public_key()),
            Amount::from_units(30),
            &ps,
        )
        .unwrap();
        asm.discard();
        assert_eq!(asm.state(), AssemblerState::Aborted);
        assert_eq!(f.ledger.transaction_count(), 0);
        assert_eq!(
            BalanceIndex::new(&f.ledger)
                .get_balance(&token(), &Identity::Key(f.alice.public_key()))
                .unwrap(),
            Amount::from_units(30)
        );
    }
}
