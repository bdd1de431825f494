//! Balance recomputation
//!
//! Maintains the invariant that every transaction's `balance_after` equals
//! the account's initial balance plus the signed sum of all preceding
//! transactions in canonical order (datetime asc, id asc).
//!
//! The walk itself is pure; the stores drive it inside the transactional
//! unit of the triggering mutation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::cmp::Ordering;

use crate::transaction::Transaction;

/// Canonical per-account order: (datetime asc, id asc)
pub fn cmp_canonical(a: &Transaction, b: &Transaction) -> Ordering {
    a.transaction_at
        .cmp(&b.transaction_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts rows into canonical order
pub fn sort_canonical(rows: &mut [Transaction]) {
    rows.sort_by(cmp_canonical);
}

/// Walks `rows` in order, setting each `balance_after` from the seed
///
/// Returns the final running balance. Rows must already be in canonical
/// order; the caller decides the seed (anchor balance or initial balance).
pub fn walk(seed: Decimal, rows: &mut [Transaction]) -> Decimal {
    let mut running = seed;
    for row in rows.iter_mut() {
        running += row.signed_amount();
        row.balance_after = Some(running);
    }
    running
}

/// Recomputes `balance_after` for all rows dated at or after `from`
///
/// Implements the anchor rule: the seed is the `balance_after` of the latest
/// row strictly before `from`, or the initial balance when there is none.
/// Rows must be the account's full history in canonical order. Returns the
/// account's new current balance. Idempotent.
pub fn recompute_from(
    initial_balance: Decimal,
    rows: &mut [Transaction],
    from: DateTime<Utc>,
) -> Decimal {
    let split = rows.partition_point(|row| row.transaction_at < from);

    // Anchor balance; replayed from the initial balance if the anchor's
    // cache is missing (mid-recompute rows).
    let seed = match rows[..split].last() {
        Some(anchor) => anchor.balance_after.unwrap_or_else(|| {
            initial_balance
                + rows[..split]
                    .iter()
                    .map(|row| row.signed_amount())
                    .sum::<Decimal>()
        }),
        None => initial_balance,
    };

    if split == rows.len() {
        return seed;
    }
    walk(seed, &mut rows[split..])
}

/// Repair walk: recomputes the entire history from the initial balance
///
/// Ignores anchors entirely; used to fix corrupted `balance_after` caches.
pub fn recompute_all(initial_balance: Decimal, rows: &mut [Transaction]) -> Decimal {
    walk(initial_balance, rows)
}

/// Running balance at an instant: initial balance plus the signed sum of all
/// rows with datetime <= `at`
///
/// This is the pre-insert balance check used for debits with validation
/// enabled. Rows must be in canonical order.
pub fn running_balance_at(
    initial_balance: Decimal,
    rows: &[Transaction],
    at: DateTime<Utc>,
) -> Decimal {
    initial_balance
        + rows
            .iter()
            .take_while(|row| row.transaction_at <= at)
            .map(|row| row.signed_amount())
            .sum::<Decimal>()
}

/// The latest row with datetime <= `at`, tie-broken by id descending
pub fn previous_before<'a>(
    rows: &'a [Transaction],
    at: DateTime<Utc>,
) -> Option<&'a Transaction> {
    rows.iter()
        .filter(|row| row.transaction_at <= at)
        .max_by(|a, b| cmp_canonical(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountKind, AccountRef};
    use crate::transaction::{AccountingStatus, TransactionType};
    use chrono::TimeZone;
    use core_kernel::{TransactionId, UserId};
    use rust_decimal_macros::dec;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap()
    }

    fn row(id: i64, day: u32, ty: TransactionType, amount: Decimal) -> Transaction {
        Transaction {
            id: TransactionId::new(id),
            account: AccountRef {
                kind: AccountKind::Principal,
                id: 1,
            },
            transaction_type: ty,
            amount,
            description: String::new(),
            reference: None,
            owner: UserId::new(1),
            transaction_at: at(day),
            balance_after: None,
            transfer_reference: None,
            accounting_status: AccountingStatus::ToPost,
            created_at: at(day),
        }
    }

    #[test]
    fn test_back_dated_insert_reorders_walk() {
        // deposit 200 on the 10th, withdrawal 50 on the 12th, then a
        // back-dated deposit 30 on the 8th
        let mut rows = vec![
            row(1, 10, TransactionType::Deposit, dec!(200)),
            row(2, 12, TransactionType::Withdrawal, dec!(50)),
            row(3, 8, TransactionType::Deposit, dec!(30)),
        ];
        sort_canonical(&mut rows);
        let current = recompute_from(dec!(0), &mut rows, at(8));

        assert_eq!(current, dec!(180));
        let balances: Vec<_> = rows.iter().map(|r| r.balance_after.unwrap()).collect();
        assert_eq!(balances, vec![dec!(30), dec!(230), dec!(180)]);
    }

    #[test]
    fn test_anchor_seeds_partial_walk() {
        let mut rows = vec![
            row(1, 5, TransactionType::Deposit, dec!(100)),
            row(2, 10, TransactionType::Deposit, dec!(40)),
            row(3, 15, TransactionType::Withdrawal, dec!(10)),
        ];
        recompute_all(dec!(0), &mut rows);

        // Corrupt the tail, then recompute from the 10th only
        rows[1].balance_after = Some(dec!(999));
        rows[2].balance_after = None;
        let current = recompute_from(dec!(0), &mut rows, at(10));

        assert_eq!(current, dec!(130));
        assert_eq!(rows[0].balance_after, Some(dec!(100)));
        assert_eq!(rows[1].balance_after, Some(dec!(140)));
        assert_eq!(rows[2].balance_after, Some(dec!(130)));
    }

    #[test]
    fn test_empty_history_returns_initial_balance() {
        let mut rows: Vec<Transaction> = Vec::new();
        assert_eq!(recompute_from(dec!(42.50), &mut rows, at(1)), dec!(42.50));
    }

    #[test]
    fn test_same_instant_ties_break_by_id() {
        let mut rows = vec![
            row(7, 10, TransactionType::Deposit, dec!(10)),
            row(3, 10, TransactionType::Deposit, dec!(20)),
        ];
        sort_canonical(&mut rows);
        recompute_all(dec!(0), &mut rows);

        assert_eq!(rows[0].id, TransactionId::new(3));
        assert_eq!(rows[0].balance_after, Some(dec!(20)));
        assert_eq!(rows[1].balance_after, Some(dec!(30)));
    }

    #[test]
    fn test_previous_before_tie_breaks_by_id_desc() {
        let mut rows = vec![
            row(3, 10, TransactionType::Deposit, dec!(20)),
            row(7, 10, TransactionType::Deposit, dec!(10)),
        ];
        sort_canonical(&mut rows);
        let prev = previous_before(&rows, at(10)).unwrap();
        assert_eq!(prev.id, TransactionId::new(7));
        assert!(previous_before(&rows, at(9)).is_none());
    }

    #[test]
    fn test_running_balance_at_includes_same_instant() {
        let mut rows = vec![
            row(1, 5, TransactionType::Deposit, dec!(100)),
            row(2, 10, TransactionType::Withdrawal, dec!(30)),
        ];
        sort_canonical(&mut rows);
        assert_eq!(running_balance_at(dec!(0), &rows, at(4)), dec!(0));
        assert_eq!(running_balance_at(dec!(0), &rows, at(5)), dec!(100));
        assert_eq!(running_balance_at(dec!(0), &rows, at(10)), dec!(70));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::account::{AccountKind, AccountRef};
    use crate::transaction::{AccountingStatus, TransactionType};
    use chrono::TimeZone;
    use core_kernel::{TransactionId, UserId};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn arb_rows() -> impl Strategy<Value = Vec<Transaction>> {
        proptest::collection::vec((1u32..28, 1i64..100_000, proptest::bool::ANY), 0..40).prop_map(
            |specs| {
                let mut rows: Vec<Transaction> = specs
                    .iter()
                    .enumerate()
                    .map(|(i, (day, minor, credit))| Transaction {
                        id: TransactionId::new(i as i64 + 1),
                        account: AccountRef {
                            kind: AccountKind::Principal,
                            id: 1,
                        },
                        transaction_type: if *credit {
                            TransactionType::Deposit
                        } else {
                            TransactionType::Withdrawal
                        },
                        amount: Decimal::new(*minor, 2),
                        description: String::new(),
                        reference: None,
                        owner: UserId::new(1),
                        transaction_at: Utc.with_ymd_and_hms(2025, 1, *day, 9, 0, 0).unwrap(),
                        balance_after: None,
                        transfer_reference: None,
                        accounting_status: AccountingStatus::ToPost,
                        created_at: Utc::now(),
                    })
                    .collect();
                sort_canonical(&mut rows);
                rows
            },
        )
    }

    proptest! {
        // Recompute is idempotent: applying it twice with the same argument
        // yields bitwise-identical balances.
        #[test]
        fn recompute_from_is_idempotent(mut rows in arb_rows(), day in 1u32..28) {
            let from = Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap();
            let first = recompute_from(dec!(0), &mut rows, from);
            let snapshot: Vec<_> = rows.iter().map(|r| r.balance_after).collect();
            let second = recompute_from(dec!(0), &mut rows, from);
            let again: Vec<_> = rows.iter().map(|r| r.balance_after).collect();

            prop_assert_eq!(first, second);
            prop_assert_eq!(snapshot, again);
        }

        // Every balance_after equals initial + signed prefix sum.
        #[test]
        fn walk_preserves_prefix_sums(mut rows in arb_rows()) {
            let initial = dec!(100);
            recompute_all(initial, &mut rows);

            let mut expected = initial;
            for row in &rows {
                expected += row.signed_amount();
                prop_assert_eq!(row.balance_after, Some(expected));
            }
        }

        // A partial recompute agrees with the full repair walk.
        #[test]
        fn recompute_from_matches_repair(mut rows in arb_rows(), day in 1u32..28) {
            let from = Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap();
            let mut repaired = rows.clone();
            recompute_all(dec!(0), &mut rows);
            let partial = recompute_from(dec!(0), &mut rows, from);
            let full = recompute_all(dec!(0), &mut repaired);

            prop_assert_eq!(partial, full);
        }
    }
}
