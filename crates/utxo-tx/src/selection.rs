//! Deterministic largest-first coin selection.

use utxo_core::{Amount, LedgerEntry};

use crate::error::Result;

/// Outcome of a selection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Enough value was found.
    Covered {
        /// Chosen entries, largest first.
        entries: Vec<LedgerEntry>,
        /// Their combined value (at least the target).
        total: Amount,
    },
    /// Every candidate together falls short.
    Short {
        /// Value reachable within the input cap.
        available: Amount,
    },
}

/// Sorts candidates largest value first, ties broken by txid then vout.
pub fn order_candidates(candidates: &mut [LedgerEntry]) {
    candidates.sort_by(|a, b| {
        b.value
            .cmp(&a.value)
            .then_with(|| a.outpoint.cmp(&b.outpoint))
    });
}

/// Picks entries largest-first until their value reaches `target`.
///
/// At most `max_inputs` entries are taken.
pub fn select_largest_first(
    mut candidates: Vec<LedgerEntry>,
    target: Amount,
    max_inputs: usize,
) -> Result<Selection> {
    order_candidates(&mut candidates);
    let mut total = Amount::ZERO;
    let mut entries = Vec::new();
    for entry in candidates.into_iter().take(max_inputs) {
        if total >= target {
            break;
        }
        total = total.try_add(entry.value, "selected value")?;
        entries.push(entry);
    }
    if total >= target {
        Ok(Selection::Covered { entries, total })
    } else {
        Ok(Selection::Short { available: total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use utxo_core::{EntryPayload, Keypair, OutPoint, SchemeVersion, SpendCondition, TxId};

    fn entry(value: u32, txid_byte: u8, vout: u32) -> LedgerEntry {
        LedgerEntry {
            outpoint: OutPoint::new(TxId::from_bytes([txid_byte; 32]), vout),
            value: Amount::from_units(value),
            token: None,
            condition: SpendCondition::SingleKey(Keypair::from_seed(&[1; 32]).public_key()),
            scheme: SchemeVersion::V2,
            payload: EntryPayload::None,
            height: 0,
            spent: false,
        }
    }

    fn values(selection: &Selection) -> Vec<i64> {
        match selection {
            Selection::Covered { entries, .. } => entries.iter().map(|e| e.value.units()).collect(),
            Selection::Short { .. } => Vec::new(),
        }
    }

    #[test]
    fn takes_largest_first() {
        let candidates = vec![entry(10, 1, 0), entry(50, 2, 0), entry(30, 3, 0)];
        let sel = select_largest_first(candidates, Amount::from_units(60), 10).unwrap();
        assert_eq!(values(&sel), vec![50, 30]);
    }

    #[test]
    fn ties_break_on_outpoint() {
        let candidates = vec![entry(20, 9, 1), entry(20, 9, 0), entry(20, 3, 5)];
        let sel = select_largest_first(candidates, Amount::from_units(20), 10).unwrap();
        let first = match sel {
            Selection::Covered { entries, .. } => entries.first().map(|e| e.outpoint),
            Selection::Short { .. } => None,
        };
        assert_eq!(first, Some(OutPoint::new(TxId::from_bytes([3; 32]), 5)));
    }

    #[test]
    fn reports_shortfall() {
        let candidates = vec![entry(10, 1, 0), entry(5, 2, 0)];
        let sel = select_largest_first(candidates, Amount::from_units(16), 10).unwrap();
        assert_eq!(sel, Selection::Short { available: Amount::from_units(15) });
    }

    #[test]
    fn respects_input_cap() {
        let candidates = vec![entry(10, 1, 0), entry(10, 2, 0), entry(10, 3, 0)];
        let sel = select_largest_first(candidates, Amount::from_units(30), 2).unwrap();
        assert_eq!(sel, Selection::Short { available: Amount::from_units(20) });
    }

    #[test]
    fn zero_target_selects_nothing() {
        let sel = select_largest_first(vec![entry(7, 1, 0)], Amount::ZERO, 10).unwrap();
        assert_eq!(sel, Selection::Covered { entries: Vec::new(), total: Amount::ZERO });
    }

    proptest! {
        #[test]
        fn covered_total_reaches_target(
            raw in proptest::collection::vec(1u32..10_000, 1..30),
            target in 1u32..100_000,
        ) {
            let candidates: Vec<_> = raw
                .iter()
                .enumerate()
                .map(|(i, v)| entry(*v, i as u8, 0))
                .collect();
            let sum: u64 = raw.iter().map(|v| u64::from(*v)).sum();
            match select_largest_first(candidates, Amount::from_units(target), 1_000).unwrap() {
                Selection::Covered { entries, total } => {
                    prop_assert!(total >= Amount::from_units(target));
                    let recomputed: i64 = entries.iter().map(|e| e.value.units()).sum();
                    prop_assert_eq!(recomputed, total.units());
                }
                Selection::Short { available } => {
                    prop_assert!(sum < u64::from(target));
                    prop_assert_eq!(available.units() as u64, sum);
                }
            }
        }
    }
}
