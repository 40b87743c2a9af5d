//! Token class metadata: info and listing.

use serde::Serialize;
use utxo_core::{Amount, LedgerEntry, PublicKey, SchemeVersion, TokenId};

use crate::error::{LedgerError, Result};
use crate::view::LedgerView;

/// Metadata of a token class as recorded by its creation entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    /// Token id.
    pub token: TokenId,
    /// Name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Units created.
    pub supply: Amount,
    /// Creator key.
    pub creator: PublicKey,
    /// Opaque data, hex encoded.
    pub data: String,
    /// Scheme the token was created under.
    pub scheme: SchemeVersion,
    /// Creation height.
    pub height: u32,
}

impl TokenInfo {
    fn from_entry(entry: &LedgerEntry) -> Option<Self> {
        let meta = entry.token_meta()?;
        Some(Self {
            token: entry.token?,
            name: meta.name.clone(),
            description: meta.description.clone(),
            supply: meta.supply,
            creator: meta.creator,
            data: hex::encode(&meta.data),
            scheme: entry.scheme,
            height: entry.height,
        })
    }
}

/// Filter for [`TokenRegistry::list`]. All criteria are optional.
#[derive(Debug, Clone, Default)]
pub struct TokenFilter {
    min_height: Option<u32>,
    max_height: Option<u32>,
    creator: Option<PublicKey>,
    scheme: Option<SchemeVersion>,
}

impl TokenFilter {
    /// Matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens created at or after `height`.
    #[must_use]
    pub const fn from_height(mut self, height: u32) -> Self {
        self.min_height = Some(height);
        self
    }

    /// Tokens created at or before `height`.
    #[must_use]
    pub const fn to_height(mut self, height: u32) -> Self {
        self.max_height = Some(height);
        self
    }

    /// Tokens created by `creator`.
    #[must_use]
    pub const fn creator(mut self, creator: PublicKey) -> Self {
        self.creator = Some(creator);
        self
    }

    /// Tokens of one scheme only.
    #[must_use]
    pub const fn scheme(mut self, scheme: SchemeVersion) -> Self {
        self.scheme = Some(scheme);
        self
    }

    fn matches(&self, info: &TokenInfo) -> bool {
        self.min_height.is_none_or(|h| info.height >= h)
            && self.max_height.is_none_or(|h| info.height <= h)
            && self.creator.is_none_or(|c| info.creator == c)
            && self.scheme.is_none_or(|s| info.scheme == s)
    }
}

/// Token class lookup over the registry index.
pub struct TokenRegistry<'a, L: LedgerView + ?Sized> {
    ledger: &'a L,
}

impl<'a, L: LedgerView + ?Sized> TokenRegistry<'a, L> {
    /// Creates a registry view over `ledger`.
    #[must_use]
    pub const fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Metadata of `token`.
    pub fn info(&self, token: &TokenId) -> Result<TokenInfo> {
        self.all()
            .into_iter()
            .find(|info| info.token == *token)
            .ok_or(LedgerError::TokenNotFound { token: *token })
    }

    /// Tokens matching `filter`, ordered by creation height then id.
    #[must_use]
    pub fn list(&self, filter: &TokenFilter) -> Vec<TokenInfo> {
        let mut tokens: Vec<_> = self.all().into_iter().filter(|i| filter.matches(i)).collect();
        tokens.sort_by(|a, b| a.height.cmp(&b.height).then(a.token.cmp(&b.token)));
        tokens
    }

    fn all(&self) -> Vec<TokenInfo> {
        SchemeVersion::ALL
            .iter()
            .flat_map(|v| self.ledger.lookup_by_key(&v.scheme().registry_index_key()))
            .filter_map(|entry| TokenInfo::from_entry(&entry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedger;
    use test_case::test_case;
    use utxo_core::{Keypair, SpendCondition, TokenMeta};

    fn issue(ledger: &MemoryLedger, name: &str, creator: &Keypair, scheme: SchemeVersion) -> TokenId {
        let meta = TokenMeta {
            name: name.into(),
            description: format!("{name} token"),
            supply: Amount::from_units(1_000),
            creator: creator.public_key(),
            data: vec![1, 2, 3],
        };
        ledger
            .issue_token(meta, SpendCondition::SingleKey(creator.public_key()), scheme)
            .unwrap()
    }

    #[test]
    fn info_returns_creation_metadata() {
        let ledger = MemoryLedger::at_height(7);
        let alice = Keypair::from_seed(&[1; 32]);
        let token = issue(&ledger, "GOLD", &alice, SchemeVersion::V2);

        let info = TokenRegistry::new(&ledger).info(&token).unwrap();
        assert_eq!(info.name, "GOLD");
        assert_eq!(info.supply, Amount::from_units(1_000));
        assert_eq!(info.creator, alice.public_key());
        assert_eq!(info.data, "010203");
        assert_eq!(info.height, 7);
    }

    #[test]
    fn info_unknown_token_fails() {
        let ledger = MemoryLedger::new();
        let err = TokenRegistry::new(&ledger)
            .info(&TokenId::from_bytes([5; 32]))
            .unwrap_err();
        assert!(matches!(err, LedgerError::TokenNotFound { .. }));
    }

    #[test_case(None, None, None, None, &["A1", "B5", "A9"] ; "no filter")]
    #[test_case(Some(2), Some(9), None, None, &["B5", "A9"] ; "height window")]
    #[test_case(None, Some(4), None, None, &["A1"] ; "upper height only")]
    #[test_case(None, None, Some(1), None, &["A1", "A9"] ; "by creator")]
    #[test_case(None, None, None, Some(SchemeVersion::V1), &["A1"] ; "legacy scheme")]
    #[test_case(Some(6), None, Some(2), None, &[] ; "creator outside window")]
    fn list_filters(
        from: Option<u32>,
        to: Option<u32>,
        creator_seed: Option<u8>,
        scheme: Option<SchemeVersion>,
        expected: &[&str],
    ) {
        let ledger = MemoryLedger::at_height(1);
        let alice = Keypair::from_seed(&[1; 32]);
        let bob = Keypair::from_seed(&[2; 32]);
        issue(&ledger, "A1", &alice, SchemeVersion::V1);
        ledger.set_height(5);
        issue(&ledger, "B5", &bob, SchemeVersion::V2);
        ledger.set_height(9);
        issue(&ledger, "A9", &alice, SchemeVersion::V2);

        let mut filter = TokenFilter::new();
        if let Some(h) = from {
            filter = filter.from_height(h);
        }
        if let Some(h) = to {
            filter = filter.to_height(h);
        }
        if let Some(seed) = creator_seed {
            filter = filter.creator(Keypair::from_seed(&[seed; 32]).public_key());
        }
        if let Some(v) = scheme {
            filter = filter.scheme(v);
        }
        let names: Vec<String> = TokenRegistry::new(&ledger)
            .list(&filter)
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, expected);
    }
}
