//! Balance queries over the ledger index.
//!
//! Every query walks all scheme versions, so holdings recorded under the
//! legacy encoding are counted alongside generalized ones.

use std::collections::BTreeMap;

use serde::Serialize;
use utxo_core::{
    Amount, Identity, IndexKey, LedgerEntry, OutPoint, SchemeVersion, SpendCondition, TokenId,
};

use crate::error::Result;
use crate::view::LedgerView;

/// Lookup keys for one identity under one scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemeIndexKeys {
    /// Scheme the keys belong to.
    pub scheme: SchemeVersion,
    /// Keys under which the identity's token entries are filed.
    pub token_keys: Vec<IndexKey>,
    /// Key under which every order of the scheme is filed.
    pub market_key: IndexKey,
}

/// Read-only balance view.
pub struct BalanceIndex<'a, L: LedgerView + ?Sized> {
    ledger: &'a L,
}

impl<'a, L: LedgerView + ?Sized> BalanceIndex<'a, L> {
    /// Creates a view over `ledger`.
    #[must_use]
    pub const fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Total unspent units of `token` whose lock `identity` can satisfy.
    pub fn get_balance(&self, token: &TokenId, identity: &Identity) -> Result<Amount> {
        let entries = self.token_entries(identity)?;
        let total = Amount::try_sum(
            entries
                .iter()
                .filter(|e| e.token.as_ref() == Some(token))
                .map(|e| e.value),
            "token balance",
        )?;
        Ok(total)
    }

    /// Per-token totals for `identity`.
    pub fn all_balances(&self, identity: &Identity) -> Result<BTreeMap<TokenId, Amount>> {
        let mut totals = BTreeMap::new();
        for entry in self.token_entries(identity)? {
            if let Some(token) = entry.token {
                let slot = totals.entry(token).or_insert(Amount::ZERO);
                *slot = slot.try_add(entry.value, "token balance")?;
            }
        }
        Ok(totals)
    }

    /// Unspent base value locked to `identity`.
    pub fn plain_balance(&self, identity: &Identity) -> Result<Amount> {
        let entries = self.plain_entries(identity)?;
        Ok(Amount::try_sum(entries.iter().map(|e| e.value), "plain balance")?)
    }

    /// Every lookup key under which entries for `identity` may be filed.
    pub fn index_keys(&self, identity: &Identity) -> Result<Vec<SchemeIndexKeys>> {
        SchemeVersion::ALL
            .iter()
            .map(|version| {
                let scheme = version.scheme();
                Ok(SchemeIndexKeys {
                    scheme: *version,
                    token_keys: scheme.derive_index_keys(identity)?,
                    market_key: scheme.market_index_key(),
                })
            })
            .collect()
    }

    /// Unspent token entries (orders excluded) locked to `identity`, in
    /// outpoint order and without duplicates.
    pub fn token_entries(&self, identity: &Identity) -> Result<Vec<LedgerEntry>> {
        let mut found = BTreeMap::new();
        for version in SchemeVersion::ALL {
            for key in version.scheme().derive_index_keys(identity)? {
                self.collect_unspent(&key, &mut found);
            }
        }
        Ok(found
            .into_values()
            .filter(|e| e.token.is_some() && e.order_terms().is_none())
            .collect())
    }

    /// Unspent plain-value entries locked to `identity`.
    pub fn plain_entries(&self, identity: &Identity) -> Result<Vec<LedgerEntry>> {
        identity.validate()?;
        let mut conditions: Vec<SpendCondition> = Vec::new();
        for version in SchemeVersion::ALL {
            for condition in version.scheme().conditions_for(identity) {
                if !conditions.contains(&condition) {
                    conditions.push(condition);
                }
            }
        }
        let mut found = BTreeMap::new();
        for condition in &conditions {
            self.collect_unspent(&IndexKey::plain(condition), &mut found);
        }
        Ok(found
            .into_values()
            .filter(|e| e.token.is_none() && e.order_terms().is_none())
            .collect())
    }

    fn collect_unspent(&self, key: &IndexKey, found: &mut BTreeMap<OutPoint, LedgerEntry>) {
        for entry in self.ledger.lookup_by_key(key) {
            if !entry.spent && self.ledger.is_unspent(&entry.outpoint) {
                found.entry(entry.outpoint).or_insert(entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedger;
    use proptest::prelude::*;
    use test_case::test_case;
    use utxo_core::{CoreError, Keypair, PublicKey};

    fn pk(seed: u8) -> PublicKey {
        Keypair::from_seed(&[seed; 32]).public_key()
    }

    fn token() -> TokenId {
        TokenId::from_bytes([0x11; 32])
    }

    #[test_case(&[(SchemeVersion::V1, 5), (SchemeVersion::V2, 7)], 12 ; "legacy and generalized")]
    #[test_case(&[(SchemeVersion::V1, 5), (SchemeVersion::V1, 6)], 11 ; "legacy only")]
    #[test_case(&[(SchemeVersion::V2, 9)], 9 ; "generalized only")]
    #[test_case(&[], 0 ; "nothing held")]
    fn counts_holdings_across_schemes(funded: &[(SchemeVersion, u32)], expected: u32) {
        let ledger = MemoryLedger::new();
        let owner = SpendCondition::SingleKey(pk(1));
        for (scheme, units) in funded {
            ledger
                .fund_token(token(), Amount::from_units(*units), owner.clone(), *scheme)
                .unwrap();
        }

        let index = BalanceIndex::new(&ledger);
        assert_eq!(
            index.get_balance(&token(), &Identity::Key(pk(1))).unwrap(),
            Amount::from_units(expected)
        );
    }

    proptest! {
        #[test]
        fn balance_equals_sum_of_own_funding(
            funded in proptest::collection::vec((1u32..10_000, any::<bool>(), any::<bool>()), 0..12),
        ) {
            let ledger = MemoryLedger::new();
            let mut mine = 0u32;
            for (units, legacy, own) in &funded {
                let scheme = if *legacy { SchemeVersion::V1 } else { SchemeVersion::V2 };
                let holder = if *own { pk(1) } else { pk(2) };
                ledger
                    .fund_token(token(), Amount::from_units(*units), SpendCondition::SingleKey(holder), scheme)
                    .unwrap();
                if *own {
                    mine += units;
                }
            }
            let balance = BalanceIndex::new(&ledger)
                .get_balance(&token(), &Identity::Key(pk(1)))
                .unwrap();
            prop_assert_eq!(balance, Amount::from_units(mine));
        }
    }

    #[test]
    fn address_locked_entries_count_for_the_key() {
        let ledger = MemoryLedger::new();
        ledger
            .fund_token(
                token(),
                Amount::from_units(3),
                SpendCondition::AddressHash(pk(1).address()),
                SchemeVersion::V2,
            )
            .unwrap();
        let index = BalanceIndex::new(&ledger);
        assert_eq!(
            index.get_balance(&token(), &Identity::Key(pk(1))).unwrap(),
            Amount::from_units(3)
        );
        assert_eq!(
            index
                .get_balance(&token(), &Identity::Address(pk(1).address()))
                .unwrap(),
            Amount::from_units(3)
        );
    }

    #[test]
    fn other_tokens_and_owners_are_excluded() {
        let ledger = MemoryLedger::new();
        let other_token = TokenId::from_bytes([0x22; 32]);
        ledger
            .fund_token(token(), Amount::from_units(4), SpendCondition::SingleKey(pk(1)), SchemeVersion::V2)
            .unwrap();
        ledger
            .fund_token(other_token, Amount::from_units(9), SpendCondition::SingleKey(pk(1)), SchemeVersion::V2)
            .unwrap();
        ledger
            .fund_token(token(), Amount::from_units(50), SpendCondition::SingleKey(pk(2)), SchemeVersion::V2)
            .unwrap();

        let index = BalanceIndex::new(&ledger);
        let all = index.all_balances(&Identity::Key(pk(1))).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&token()], Amount::from_units(4));
        assert_eq!(all[&other_token], Amount::from_units(9));
    }

    #[test]
    fn threshold_identity_sees_threshold_entries() {
        let ledger = MemoryLedger::new();
        let keys = vec![pk(1), pk(2), pk(3)];
        let cond = SpendCondition::threshold(2, keys.clone()).unwrap();
        ledger
            .fund_token(token(), Amount::from_units(8), cond, SchemeVersion::V2)
            .unwrap();
        let index = BalanceIndex::new(&ledger);
        let group = Identity::Threshold { m: 2, keys };
        assert_eq!(index.get_balance(&token(), &group).unwrap(), Amount::from_units(8));
        assert_eq!(
            index.get_balance(&token(), &Identity::Key(pk(1))).unwrap(),
            Amount::ZERO
        );
    }

    #[test]
    fn invalid_identity_fails() {
        let ledger = MemoryLedger::new();
        let index = BalanceIndex::new(&ledger);
        let bad = Identity::Threshold { m: 0, keys: vec![pk(1)] };
        let err = index.get_balance(&token(), &bad).unwrap_err();
        assert!(matches!(err, crate::LedgerError::Core(CoreError::InvalidIdentity(_))));
    }

    #[test]
    fn index_keys_cover_every_scheme() {
        let ledger = MemoryLedger::new();
        let keys = BalanceIndex::new(&ledger).index_keys(&Identity::Key(pk(1))).unwrap();
        assert_eq!(keys.len(), SchemeVersion::ALL.len());
        assert_eq!(keys[0].token_keys.len(), 1);
        assert_eq!(keys[1].token_keys.len(), 2);
        assert_ne!(keys[0].market_key, keys[1].market_key);
    }

    #[test]
    fn plain_balance_sums_base_value() {
        let ledger = MemoryLedger::new();
        ledger.fund_plain(Amount::from_units(100), SpendCondition::SingleKey(pk(1))).unwrap();
        ledger
            .fund_plain(Amount::from_units(50), SpendCondition::AddressHash(pk(1).address()))
            .unwrap();
        let index = BalanceIndex::new(&ledger);
        assert_eq!(
            index.plain_balance(&Identity::Key(pk(1))).unwrap(),
            Amount::from_units(150)
        );
    }
}
