//! Order book over ledger entries.
//!
//! Orders are not kept in a side database. Each open order is an entry
//! filed under its scheme's market index key, carrying its terms as payload
//! and locked so that the owner can cancel and the market key can settle a
//! fill. A partial fill spends the entry and writes a continuation with the
//! reduced remaining amount; the order keeps the id of the transaction that
//! first posted it. Cancelling writes a refund entry marked with the order
//! id, so a closed order's status is read back from the ledger as well.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utxo_core::{
    Amount, CustodyChain, EntryPayload, Identity, KeyCustody, LedgerEntry, OrderCancellation,
    OrderTerms, PublicKey, SchemeVersion, Side, SpendCondition, TokenId, TxId, TxOutput,
};
use utxo_ledger::{Broadcaster, LedgerView};
use utxo_tx::{FinalizeOutcome, PartiallySignedTx, Probe, TxAssembler};

use crate::config::MarketConfig;
use crate::error::{MarketError, Result};
use crate::order::{Order, OrderId, OrderStatus};
use crate::settlement::{bid_lock, plan_fill};

/// Parameters of a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Bid or ask.
    pub side: Side,
    /// Token traded.
    pub token: TokenId,
    /// Quantity offered or wanted.
    pub amount: Amount,
    /// Base units per token unit.
    pub unit_price: Amount,
    /// Last fillable height; defaults to the configured window.
    pub expiry_height: Option<u32>,
    /// Owner key.
    pub owner: PublicKey,
}

impl OrderRequest {
    /// An offer to sell `amount` of `token`.
    #[must_use]
    pub const fn ask(token: TokenId, amount: Amount, unit_price: Amount, owner: PublicKey) -> Self {
        Self {
            side: Side::Ask,
            token,
            amount,
            unit_price,
            expiry_height: None,
            owner,
        }
    }

    /// An offer to buy `amount` of `token`.
    #[must_use]
    pub const fn bid(token: TokenId, amount: Amount, unit_price: Amount, owner: PublicKey) -> Self {
        Self {
            side: Side::Bid,
            token,
            amount,
            unit_price,
            expiry_height: None,
            owner,
        }
    }

    /// Sets an explicit expiry height.
    #[must_use]
    pub const fn expires_at(mut self, height: u32) -> Self {
        self.expiry_height = Some(height);
        self
    }
}

/// What happened to a market transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketOutcome {
    /// Fully signed and accepted by the ledger.
    Broadcast(TxId),
    /// Built but waiting for co-signers; nothing was broadcast.
    AwaitingSignatures(PartiallySignedTx),
}

/// Result of a create, fill or cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketReceipt {
    /// Order affected.
    pub order_id: OrderId,
    /// Broadcast or pending.
    pub outcome: MarketOutcome,
}

impl MarketReceipt {
    /// Id of the market transaction.
    #[must_use]
    pub fn txid(&self) -> TxId {
        match &self.outcome {
            MarketOutcome::Broadcast(txid) => *txid,
            MarketOutcome::AwaitingSignatures(partial) => partial.txid(),
        }
    }

    /// Whether the transaction reached the ledger.
    #[must_use]
    pub const fn is_broadcast(&self) -> bool {
        matches!(self.outcome, MarketOutcome::Broadcast(_))
    }
}

/// Current carrier of an order plus its derived status.
struct Located {
    entry: LedgerEntry,
    terms: OrderTerms,
    status: OrderStatus,
    remaining: Amount,
}

/// Creates, fills, cancels and lists orders against a ledger.
pub struct OrderBook<'a, L: LedgerView + Broadcaster + ?Sized> {
    ledger: &'a L,
    config: MarketConfig,
}

impl<'a, L: LedgerView + Broadcaster + ?Sized> OrderBook<'a, L> {
    /// Creates an order book over `ledger`.
    #[must_use]
    pub fn new(ledger: &'a L, config: MarketConfig) -> Self {
        Self { ledger, config }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Posts a new order, locking tokens (ask) or `amount × unit_price` of
    /// base value (bid) from the owner's holdings.
    pub fn create_order(
        &self,
        request: OrderRequest,
        custody: &dyn KeyCustody,
    ) -> Result<MarketReceipt> {
        let OrderRequest {
            side,
            token,
            amount,
            unit_price,
            expiry_height,
            owner,
        } = request;
        if !amount.is_positive() {
            return Err(MarketError::invalid_order("amount must be positive"));
        }
        if !unit_price.is_positive() {
            return Err(MarketError::invalid_order("unit price must be positive"));
        }
        let height = self.ledger.height();
        let expiry_height = match expiry_height {
            Some(h) if h < height => {
                return Err(MarketError::invalid_order(format!(
                    "expiry height {h} is below current height {height}"
                )));
            }
            Some(h) => h,
            None => height
                .checked_add(self.config.default_expiry_blocks)
                .ok_or_else(|| MarketError::invalid_order("expiry height out of range"))?,
        };

        let scheme = self.config.scheme;
        let terms = OrderTerms {
            side,
            token,
            owner,
            total: amount,
            remaining: amount,
            unit_price,
            expiry_height,
            origin: None,
        };
        let condition = scheme.scheme().order_condition(&owner);
        let owner_id = Identity::Key(owner);
        let probes = Probe::for_identity(&owner_id, custody)?;

        let mut asm = TxAssembler::new(self.ledger, self.config.assembler_config());
        asm.begin(None)?;
        match side {
            Side::Ask => {
                let output = TxOutput::token(token, amount, condition, scheme)
                    .with_payload(EntryPayload::Order(terms));
                asm.add_transfer_outputs(&token, &[owner_id.clone()], vec![output], &probes)?;
            }
            Side::Bid => {
                let lock = bid_lock(amount, unit_price)?;
                let output = TxOutput::plain(lock, condition, scheme)
                    .with_payload(EntryPayload::Order(terms));
                asm.add_output(output)?;
            }
        }
        let outcome = asm.finalize(&owner_id.change_condition(), &probes, custody)?;
        let order_id = OrderId::from(outcome.txid());
        let outcome = self.settle(outcome)?;

        info!(
            order_id = %order_id,
            side = %side,
            token = %token,
            amount = %amount,
            unit_price = %unit_price,
            expiry_height,
            "order posted"
        );
        Ok(MarketReceipt { order_id, outcome })
    }

    /// Fills `fill` units of an open order on behalf of `filler`.
    ///
    /// Settles at the posted price unless `price_override` is given, which
    /// must not be worse for the resting order than posted.
    pub fn fill_order(
        &self,
        order_id: &OrderId,
        fill: Amount,
        price_override: Option<Amount>,
        filler: &Identity,
        custody: &dyn KeyCustody,
    ) -> Result<MarketReceipt> {
        let Located {
            entry,
            terms,
            status,
            ..
        } = self.locate(order_id)?;
        if !status.is_open() {
            return Err(MarketError::OrderClosed {
                order_id: *order_id,
                status,
            });
        }
        if terms.is_expired(self.ledger.height()) {
            return Err(MarketError::OrderExpired {
                order_id: *order_id,
                expiry_height: terms.expiry_height,
            });
        }
        let plan = plan_fill(
            &terms,
            entry.value,
            fill,
            price_override,
            self.config.enforce_price_guard,
        )?;

        let market = entry.scheme.scheme().market_keypair();
        let order_probe = Probe::build(entry.condition.clone(), entry.scheme, &[market.public_key()])?;
        let filler_probes = Probe::for_identity(filler, custody)?;
        let filler_cond = filler.change_condition();
        let owner_cond = SpendCondition::SingleKey(terms.owner);
        let out = self.config.scheme;
        let continuation = (!plan.is_complete()).then(|| {
            EntryPayload::Order(OrderTerms {
                remaining: plan.remaining,
                origin: Some(order_id.txid()),
                ..terms.clone()
            })
        });

        let mut asm = TxAssembler::new(self.ledger, self.config.assembler_config());
        asm.begin(None)?;
        asm.add_input(entry.clone(), order_probe)?;
        match terms.side {
            Side::Ask => {
                asm.add_output(TxOutput::token(terms.token, plan.fill, filler_cond.clone(), out))?;
                asm.add_output(TxOutput::plain(plan.payment, owner_cond, out))?;
                if let Some(payload) = continuation {
                    let rest = TxOutput::token(
                        terms.token,
                        plan.continuation_value,
                        entry.condition.clone(),
                        entry.scheme,
                    );
                    asm.add_output(rest.with_payload(payload))?;
                }
            }
            Side::Bid => {
                let delivery = TxOutput::token(terms.token, plan.fill, owner_cond.clone(), out);
                asm.add_transfer_outputs(
                    &terms.token,
                    std::slice::from_ref(filler),
                    vec![delivery],
                    &filler_probes,
                )?;
                asm.add_output(TxOutput::plain(plan.payment, filler_cond.clone(), out))?;
                if plan.refund.is_positive() {
                    asm.add_output(TxOutput::plain(plan.refund, owner_cond, out))?;
                }
                if let Some(payload) = continuation {
                    let rest =
                        TxOutput::plain(plan.continuation_value, entry.condition.clone(), entry.scheme);
                    asm.add_output(rest.with_payload(payload))?;
                }
            }
        }

        let signers = CustodyChain::new(custody, &market);
        let outcome = asm.finalize(&filler_cond, &filler_probes, &signers)?;
        let outcome = self.settle(outcome)?;

        info!(
            order_id = %order_id,
            fill = %plan.fill,
            price = %plan.price,
            remaining = %plan.remaining,
            "order filled"
        );
        Ok(MarketReceipt {
            order_id: *order_id,
            outcome,
        })
    }

    /// Withdraws an open order, returning its locked value to the owner.
    ///
    /// The owner pays the fee from their own plain holdings.
    pub fn cancel_order(
        &self,
        order_id: &OrderId,
        requester: &PublicKey,
        custody: &dyn KeyCustody,
    ) -> Result<MarketReceipt> {
        let Located {
            entry,
            terms,
            status,
            remaining,
        } = self.locate(order_id)?;
        if !status.can_transition_to(&OrderStatus::Cancelled) {
            return Err(MarketError::OrderNotCancellable {
                order_id: *order_id,
                status,
            });
        }
        if *requester != terms.owner || !custody.controls(requester) {
            return Err(MarketError::NotOrderOwner(*order_id));
        }

        let market = entry.scheme.scheme().market_keypair();
        let order_probe = Probe::build(
            entry.condition.clone(),
            entry.scheme,
            &[terms.owner, market.public_key()],
        )?;
        let owner_id = Identity::Key(terms.owner);
        let owner_cond = owner_id.change_condition();
        let funding = Probe::for_identity(&owner_id, custody)?;
        let out = self.config.scheme;
        let marker = EntryPayload::Cancellation(OrderCancellation {
            order_id: order_id.txid(),
            remaining,
        });
        let refund = match terms.side {
            Side::Ask => TxOutput::token(terms.token, entry.value, owner_cond.clone(), out),
            Side::Bid => TxOutput::plain(entry.value, owner_cond.clone(), out),
        }
        .with_payload(marker);

        let mut asm = TxAssembler::new(self.ledger, self.config.assembler_config());
        asm.begin(None)?;
        asm.add_input(entry, order_probe)?;
        asm.add_output(refund)?;

        let signers = CustodyChain::new(custody, &market);
        let outcome = asm.finalize(&owner_cond, &funding, &signers)?;
        let outcome = self.settle(outcome)?;

        info!(order_id = %order_id, side = %terms.side, "order cancelled");
        Ok(MarketReceipt {
            order_id: *order_id,
            outcome,
        })
    }

    /// Token-for-token orders.
    pub fn create_swap_order(
        &self,
        offered: &TokenId,
        wanted: &TokenId,
        _custody: &dyn KeyCustody,
    ) -> Result<MarketReceipt> {
        Err(MarketError::not_supported(format!(
            "swap orders ({offered} for {wanted})"
        )))
    }

    /// Snapshot of one order in any status.
    pub fn order(&self, order_id: &OrderId) -> Result<Order> {
        let located = self.locate(order_id)?;
        let mut order = Order::from_entry(&located.entry)
            .ok_or(MarketError::OrderNotFound(*order_id))?;
        order.status = located.status;
        order.remaining = located.remaining;
        Ok(order)
    }

    /// Open orders, optionally for one token, in book order.
    #[must_use]
    pub fn orders(&self, token: Option<&TokenId>) -> Vec<Order> {
        self.open_orders(|o| token.is_none_or(|t| o.token == *t))
    }

    /// Open orders posted by `owner`, in book order.
    #[must_use]
    pub fn orders_of(&self, owner: &PublicKey) -> Vec<Order> {
        self.open_orders(|o| o.owner == *owner)
    }

    fn open_orders(&self, keep: impl Fn(&Order) -> bool) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .order_entries()
            .iter()
            .filter(|e| !e.spent)
            .filter_map(Order::from_entry)
            .filter(|o| keep(o))
            .collect();
        orders.sort_by(book_order);
        orders
    }

    fn market_entries(&self) -> Vec<LedgerEntry> {
        SchemeVersion::ALL
            .iter()
            .flat_map(|v| self.ledger.lookup_by_key(&v.scheme().market_index_key()))
            .collect()
    }

    fn order_entries(&self) -> Vec<LedgerEntry> {
        let mut entries = self.market_entries();
        entries.retain(|e| e.order_terms().is_some());
        entries
    }

    /// Finds the entry currently carrying `order_id`.
    ///
    /// The unspent carrier wins. Once every carrier is spent the order is
    /// closed: cancelled if a refund entry carries its cancellation marker,
    /// filled otherwise.
    fn locate(&self, order_id: &OrderId) -> Result<Located> {
        let market = self.market_entries();
        let mut carriers: Vec<(LedgerEntry, OrderTerms)> = market
            .iter()
            .filter_map(|e| {
                let terms = e.order_terms()?;
                (OrderId::new(terms.order_id(&e.outpoint)) == *order_id)
                    .then(|| (e.clone(), terms.clone()))
            })
            .collect();
        carriers.sort_by(|a, b| a.0.spent.cmp(&b.0.spent).then(a.1.remaining.cmp(&b.1.remaining)));
        let (entry, terms) = carriers
            .into_iter()
            .next()
            .ok_or(MarketError::OrderNotFound(*order_id))?;

        let cancelled = || {
            market
                .iter()
                .filter_map(LedgerEntry::cancellation)
                .find(|c| OrderId::new(c.order_id) == *order_id)
        };
        let (status, remaining) = if entry.spent {
            match cancelled() {
                Some(marker) => (OrderStatus::Cancelled, marker.remaining),
                None => (OrderStatus::Filled, Amount::ZERO),
            }
        } else if terms.remaining == terms.total {
            (OrderStatus::Open, terms.remaining)
        } else {
            (OrderStatus::PartiallyFilled, terms.remaining)
        };
        debug!(order_id = %order_id, outpoint = %entry.outpoint, status = %status, "order located");
        Ok(Located {
            entry,
            terms,
            status,
            remaining,
        })
    }

    fn settle(&self, outcome: FinalizeOutcome) -> Result<MarketOutcome> {
        match outcome {
            FinalizeOutcome::Signed(signed) => {
                let txid = Broadcaster::broadcast(self.ledger, &signed.tx, &signed.witnesses)?;
                Ok(MarketOutcome::Broadcast(txid))
            }
            FinalizeOutcome::PartiallySigned(partial) => {
                debug!(txid = %partial.txid(), needed = partial.signatures_needed(), "market transaction awaits co-signers");
                Ok(MarketOutcome::AwaitingSignatures(partial))
            }
        }
    }
}

/// Groups by token, asks before bids, best price first, then by id.
fn book_order(a: &Order, b: &Order) -> Ordering {
    let side_rank = |s: Side| match s {
        Side::Ask => 0u8,
        Side::Bid => 1u8,
    };
    a.token
        .cmp(&b.token)
        .then(side_rank(a.side).cmp(&side_rank(b.side)))
        .then(match a.side {
            Side::Ask => a.unit_price.cmp(&b.unit_price),
            Side::Bid => b.unit_price.cmp(&a.unit_price),
        })
        .then(a.id.cmp(&b.id))
}
