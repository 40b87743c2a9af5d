//! Ledger entries and the structured payloads they carry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::condition::{IndexKey, SpendCondition};
use crate::error::{CoreError, Result};
use crate::ids::{OutPoint, TokenId, TxId};
use crate::keys::PublicKey;
use crate::scheme::SchemeVersion;

/// Maximum token name length in bytes.
pub const MAX_TOKEN_NAME_LEN: usize = 32;

/// Maximum token description length in bytes.
pub const MAX_TOKEN_DESCRIPTION_LEN: usize = 4096;

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Offer to buy tokens, locking base value.
    Bid,
    /// Offer to sell tokens, locking the tokens.
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

/// Order metadata embedded in an order entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTerms {
    /// Bid or ask.
    pub side: Side,
    /// Token being traded.
    pub token: TokenId,
    /// Key that posted the order and receives its proceeds.
    pub owner: PublicKey,
    /// Quantity originally posted.
    pub total: Amount,
    /// Quantity still open.
    pub remaining: Amount,
    /// Base units per token unit.
    pub unit_price: Amount,
    /// Last height at which the order may be filled.
    pub expiry_height: u32,
    /// Transaction that first posted the order; `None` on the original entry.
    pub origin: Option<TxId>,
}

impl OrderTerms {
    /// Stable order identifier given the outpoint currently carrying the order.
    #[must_use]
    pub fn order_id(&self, outpoint: &OutPoint) -> TxId {
        self.origin.unwrap_or(outpoint.txid)
    }

    /// Whether the order is past its expiry at `height`.
    #[must_use]
    pub const fn is_expired(&self, height: u32) -> bool {
        height > self.expiry_height
    }
}

/// Marks the refund output of a cancelled order.
///
/// Lets any reader of the ledger tell a cancelled order from a filled one
/// once its last carrier is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancellation {
    /// Order that was withdrawn.
    pub order_id: TxId,
    /// Quantity still open when it was withdrawn.
    pub remaining: Amount,
}

/// Metadata of a token class, carried by its creation output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMeta {
    /// Short name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Total units created.
    pub supply: Amount,
    /// Creator's key.
    pub creator: PublicKey,
    /// Opaque application data.
    #[serde(default, with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl TokenMeta {
    /// Checks name, description and supply limits.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.len() > MAX_TOKEN_NAME_LEN {
            return Err(CoreError::InvalidTokenMeta(format!(
                "token name must be 1..={MAX_TOKEN_NAME_LEN} bytes"
            )));
        }
        if self.description.len() > MAX_TOKEN_DESCRIPTION_LEN {
            return Err(CoreError::InvalidTokenMeta(format!(
                "token description exceeds {MAX_TOKEN_DESCRIPTION_LEN} bytes"
            )));
        }
        if !self.supply.is_positive() {
            return Err(CoreError::InvalidTokenMeta("supply must be positive".into()));
        }
        Ok(())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(de::Error::custom)
    }
}

/// Structured auxiliary payload of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EntryPayload {
    /// No payload.
    #[default]
    None,
    /// The entry is a resting order.
    Order(OrderTerms),
    /// The entry created a token class.
    TokenCreation(TokenMeta),
    /// The entry refunds a cancelled order.
    Cancellation(OrderCancellation),
}

impl EntryPayload {
    /// Fixed binary encoding hashed into the transaction id.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::None => out.push(0x00),
            Self::Order(terms) => {
                out.push(0x01);
                out.push(match terms.side {
                    Side::Bid => 0,
                    Side::Ask => 1,
                });
                out.extend_from_slice(terms.token.as_bytes());
                out.extend_from_slice(terms.owner.as_bytes());
                out.extend_from_slice(&terms.total.units().to_le_bytes());
                out.extend_from_slice(&terms.remaining.units().to_le_bytes());
                out.extend_from_slice(&terms.unit_price.units().to_le_bytes());
                out.extend_from_slice(&terms.expiry_height.to_le_bytes());
                match &terms.origin {
                    Some(origin) => {
                        out.push(1);
                        out.extend_from_slice(origin.as_bytes());
                    }
                    None => out.push(0),
                }
            }
            Self::TokenCreation(meta) => {
                out.push(0x02);
                put_bytes(&mut out, meta.name.as_bytes());
                put_bytes(&mut out, meta.description.as_bytes());
                out.extend_from_slice(&meta.supply.units().to_le_bytes());
                out.extend_from_slice(meta.creator.as_bytes());
                put_bytes(&mut out, &meta.data);
            }
            Self::Cancellation(c) => {
                out.push(0x03);
                out.extend_from_slice(c.order_id.as_bytes());
                out.extend_from_slice(&c.remaining.units().to_le_bytes());
            }
        }
        out
    }
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}

/// What an output carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    /// Base value.
    Plain,
    /// Units of an existing token.
    Token(TokenId),
    /// Units of the token created by this very transaction.
    Created,
}

/// An output recorded by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Where the entry lives.
    pub outpoint: OutPoint,
    /// Units held: token units if `token` is set, base units otherwise.
    pub value: Amount,
    /// Token class, if any.
    pub token: Option<TokenId>,
    /// Lock.
    pub condition: SpendCondition,
    /// Encoding of the lock.
    pub scheme: SchemeVersion,
    /// Auxiliary payload.
    pub payload: EntryPayload,
    /// Height at which the entry was created.
    pub height: u32,
    /// Set once a broadcast transaction consumed the entry.
    pub spent: bool,
}

impl LedgerEntry {
    /// Order terms, if this entry is an order.
    #[must_use]
    pub fn order_terms(&self) -> Option<&OrderTerms> {
        match &self.payload {
            EntryPayload::Order(terms) => Some(terms),
            _ => None,
        }
    }

    /// Token metadata, if this entry created a token.
    #[must_use]
    pub fn token_meta(&self) -> Option<&TokenMeta> {
        match &self.payload {
            EntryPayload::TokenCreation(meta) => Some(meta),
            _ => None,
        }
    }

    /// Cancellation marker, if this entry refunds a cancelled order.
    #[must_use]
    pub fn cancellation(&self) -> Option<&OrderCancellation> {
        match &self.payload {
            EntryPayload::Cancellation(c) => Some(c),
            _ => None,
        }
    }

    /// Keys under which the ledger files this entry.
    ///
    /// Orders are filed only under their scheme's market key. Creation
    /// entries are also filed under the registry key and cancellation
    /// refunds under the market key, next to their owner's holdings.
    #[must_use]
    pub fn index_keys(&self) -> Vec<IndexKey> {
        let scheme = self.scheme.scheme();
        match &self.payload {
            EntryPayload::Order(_) => vec![scheme.market_index_key()],
            payload => {
                let primary = match self.token {
                    Some(_) => scheme.token_index_key(&self.condition),
                    None => IndexKey::plain(&self.condition),
                };
                let mut keys = vec![primary];
                match payload {
                    EntryPayload::TokenCreation(_) => keys.push(scheme.registry_index_key()),
                    EntryPayload::Cancellation(_) => keys.push(scheme.market_index_key()),
                    _ => {}
                }
                keys
            }
        }
    }
}
