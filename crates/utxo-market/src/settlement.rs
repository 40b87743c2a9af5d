//! Fill arithmetic for resting orders.
//!
//! All amounts are integer minimal units. Products use checked `i128`
//! intermediates through [`Amount::checked_mul`]; anything that would leave
//! the `i64` range is rejected with `AmountOverflow`, never truncated.
//!
//! An ask entry locks the remaining token quantity. A bid entry locks
//! `remaining × posted price` of base value. A fill splits that lock into
//! the counterparty's leg and, unless the order is used up, a continuation
//! entry carrying the rest.

use serde::{Deserialize, Serialize};
use utxo_core::{Amount, OrderTerms, Side};

use crate::error::{MarketError, Result};

/// How a single fill divides an order entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillPlan {
    /// Token units changing hands.
    pub fill: Amount,
    /// Unit price the fill settles at.
    pub price: Amount,
    /// Base value paid by the filler (ask) or to the filler (bid).
    pub payment: Amount,
    /// Bid only: locked base value handed back to the owner.
    pub refund: Amount,
    /// Quantity left open after the fill.
    pub remaining: Amount,
    /// Value the continuation entry locks; zero once the order is used up.
    pub continuation_value: Amount,
}

impl FillPlan {
    /// Whether the fill consumes the order entirely.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.remaining.is_zero()
    }
}

/// Base value locked by a bid for `amount` units at `unit_price`.
pub fn bid_lock(amount: Amount, unit_price: Amount) -> Result<Amount> {
    amount
        .checked_mul(unit_price)
        .ok_or(MarketError::overflow("bid lock"))
}

/// Checks that `offered` is at least as good for the resting order as `posted`.
pub fn check_price(side: Side, posted: Amount, offered: Amount) -> Result<()> {
    let acceptable = match side {
        Side::Ask => offered >= posted,
        Side::Bid => offered <= posted,
    };
    if acceptable {
        Ok(())
    } else {
        Err(MarketError::PriceWorseThanPosted { offered, posted })
    }
}

/// Splits an order entry locking `locked` for a fill of `fill` units.
///
/// A bid can never pay above its posted price since the extra value is not
/// in the lock; the guard flag only relaxes ask pricing.
pub fn plan_fill(
    terms: &OrderTerms,
    locked: Amount,
    fill: Amount,
    price_override: Option<Amount>,
    enforce_price_guard: bool,
) -> Result<FillPlan> {
    if !fill.is_positive() {
        return Err(MarketError::invalid_order("fill amount must be positive"));
    }
    if fill > terms.remaining {
        return Err(MarketError::InsufficientRemainingAmount {
            requested: fill,
            remaining: terms.remaining,
        });
    }
    let price = price_override.unwrap_or(terms.unit_price);
    if !price.is_positive() {
        return Err(MarketError::invalid_order("unit price must be positive"));
    }
    if enforce_price_guard || terms.side == Side::Bid {
        check_price(terms.side, terms.unit_price, price)?;
    }

    let remaining = terms
        .remaining
        .checked_sub(fill)
        .ok_or(MarketError::overflow("remaining amount"))?;
    let payment = fill
        .checked_mul(price)
        .ok_or(MarketError::overflow("fill payment"))?;

    match terms.side {
        Side::Ask => {
            if locked != terms.remaining {
                return Err(MarketError::invalid_order(format!(
                    "ask entry locks {locked} tokens but {} remain",
                    terms.remaining
                )));
            }
            Ok(FillPlan {
                fill,
                price,
                payment,
                refund: Amount::ZERO,
                remaining,
                continuation_value: remaining,
            })
        }
        Side::Bid => {
            let consumed = bid_lock(fill, terms.unit_price)?;
            let mut refund = consumed
                .checked_sub(payment)
                .ok_or(MarketError::overflow("bid refund"))?;
            let leftover = locked.checked_sub(consumed).ok_or_else(|| {
                MarketError::invalid_order(format!("bid entry locks only {locked}"))
            })?;
            let continuation_value = if remaining.is_zero() {
                refund = refund
                    .checked_add(leftover)
                    .ok_or(MarketError::overflow("bid refund"))?;
                Amount::ZERO
            } else if leftover.is_positive() {
                leftover
            } else {
                return Err(MarketError::invalid_order(
                    "bid entry has no value left for its remaining quantity",
                ));
            };
            Ok(FillPlan {
                fill,
                price,
                payment,
                refund,
                remaining,
                continuation_value,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;
    use utxo_core::{Keypair, TokenId};

    fn terms(side: Side, total: u32, remaining: u32, price: u32) -> OrderTerms {
        OrderTerms {
            side,
            token: TokenId::from_bytes([1; 32]),
            owner: Keypair::from_seed(&[1; 32]).public_key(),
            total: Amount::from_units(total),
            remaining: Amount::from_units(remaining),
            unit_price: Amount::from_units(price),
            expiry_height: 100,
            origin: None,
        }
    }

    fn units(v: u32) -> Amount {
        Amount::from_units(v)
    }

    #[test]
    fn ask_partial_fill() {
        let plan = plan_fill(&terms(Side::Ask, 100, 100, 3), units(100), units(30), None, true).unwrap();
        assert_eq!(plan.payment, units(90));
        assert_eq!(plan.remaining, units(70));
        assert_eq!(plan.continuation_value, units(70));
        assert!(!plan.is_complete());
    }

    #[test]
    fn ask_fill_rejects_more_than_remaining() {
        let err = plan_fill(&terms(Side::Ask, 100, 30, 3), units(30), units(50), None, true).unwrap_err();
        assert!(matches!(
            err,
            MarketError::InsufficientRemainingAmount { requested, remaining }
                if requested == units(50) && remaining == units(30)
        ));
    }

    #[test]
    fn bid_fill_below_posted_refunds_owner() {
        // Bid for 10 at 5 locks 50; fill 4 at 3 pays 12 and returns 8.
        let plan = plan_fill(&terms(Side::Bid, 10, 10, 5), units(50), units(4), Some(units(3)), true).unwrap();
        assert_eq!(plan.payment, units(12));
        assert_eq!(plan.refund, units(8));
        assert_eq!(plan.continuation_value, units(30));
    }

    #[test]
    fn complete_bid_fill_returns_leftover() {
        let plan = plan_fill(&terms(Side::Bid, 10, 2, 5), units(11), units(2), None, true).unwrap();
        assert!(plan.is_complete());
        assert_eq!(plan.payment, units(10));
        assert_eq!(plan.refund, units(1));
        assert_eq!(plan.continuation_value, Amount::ZERO);
    }

    #[test_case(Side::Ask, 5, 4, false ; "ask below posted")]
    #[test_case(Side::Ask, 5, 6, true ; "ask above posted")]
    #[test_case(Side::Bid, 5, 6, false ; "bid above posted")]
    #[test_case(Side::Bid, 5, 4, true ; "bid below posted")]
    #[test_case(Side::Bid, 5, 5, true ; "bid at posted")]
    fn price_guard(side: Side, posted: u32, offered: u32, ok: bool) {
        assert_eq!(check_price(side, units(posted), units(offered)).is_ok(), ok);
    }

    #[test]
    fn lenient_guard_allows_cheap_ask_fill() {
        let t = terms(Side::Ask, 10, 10, 5);
        assert!(plan_fill(&t, units(10), units(1), Some(units(1)), true).is_err());
        assert!(plan_fill(&t, units(10), units(1), Some(units(1)), false).is_ok());
    }

    #[test]
    fn lenient_guard_still_caps_bid_price() {
        let t = terms(Side::Bid, 10, 10, 5);
        let err = plan_fill(&t, units(50), units(1), Some(units(6)), false).unwrap_err();
        assert!(matches!(err, MarketError::PriceWorseThanPosted { .. }));
    }

    #[test]
    fn payment_overflow_is_rejected() {
        let mut t = terms(Side::Ask, 10, 10, 1);
        t.unit_price = Amount::MAX;
        let err = plan_fill(&t, units(10), units(2), None, true).unwrap_err();
        assert!(matches!(err, MarketError::AmountOverflow { .. }));
    }

    proptest! {
        #[test]
        fn bid_fills_split_lock_exactly(
            total in 1u32..500,
            price in 1u32..1_000,
            fills in proptest::collection::vec(1u32..100, 1..10),
        ) {
            let mut t = terms(Side::Bid, total, total, price);
            let mut locked = bid_lock(units(total), units(price)).unwrap();
            for f in fills {
                let result = plan_fill(&t, locked, units(f), None, true);
                if units(f) > t.remaining {
                    prop_assert!(matches!(result, Err(MarketError::InsufficientRemainingAmount { .. })), "expected InsufficientRemainingAmount, got {:?}", result);
                    continue;
                }
                let plan = result.unwrap();
                let paid_out = plan.payment.units() + plan.refund.units() + plan.continuation_value.units();
                prop_assert_eq!(paid_out, locked.units());
                prop_assert!(plan.remaining < t.remaining);
                t.remaining = plan.remaining;
                locked = plan.continuation_value;
                if plan.is_complete() {
                    break;
                }
            }
        }

        #[test]
        fn ask_remaining_never_increases(
            total in 1u32..1_000,
            fills in proptest::collection::vec(1u32..300, 1..10),
        ) {
            let mut t = terms(Side::Ask, total, total, 2);
            for f in fills {
                if t.remaining.is_zero() {
                    break;
                }
                let result = plan_fill(&t, t.remaining, units(f), None, true);
                if units(f) > t.remaining {
                    prop_assert!(matches!(result, Err(MarketError::InsufficientRemainingAmount { .. })), "expected InsufficientRemainingAmount, got {:?}", result);
                    continue;
                }
                let plan = result.unwrap();
                prop_assert_eq!(plan.remaining.units() + plan.fill.units(), t.remaining.units());
                t.remaining = plan.remaining;
            }
        }
    }
}
