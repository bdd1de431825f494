//! Period queries over account histories
//!
//! All functions are read-only and consistent with the canonical ordering
//! rule (datetime asc, id asc). They operate on full histories in canonical
//! order; the stores pass rows fetched inside one snapshot.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use core_kernel::{end_of_day, DateRange};

use crate::account::AccountRef;
use crate::balance::running_balance_at;
use crate::transaction::Transaction;

/// Direction filter for counterparty aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Credit transfer rows: money arriving on the account
    Incoming,
    /// Debit transfer rows: money leaving the account
    Outgoing,
}

/// Credit/debit totals over a period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodStatistics {
    pub credit_total: Decimal,
    pub debit_total: Decimal,
    pub count: usize,
}

/// Transfer volume toward one counterparty account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterpartySummary {
    pub account: AccountRef,
    pub total: Decimal,
    pub count: usize,
}

/// Transactions within the range, newest first
pub fn balance_history<'a>(rows: &'a [Transaction], range: &DateRange) -> Vec<&'a Transaction> {
    let mut selected: Vec<&Transaction> = rows
        .iter()
        .filter(|row| range.contains_instant(row.transaction_at))
        .collect();
    selected.reverse();
    selected
}

/// The account balance at the end of each calendar day in the range
///
/// Days without transactions carry the previous day's value; days before the
/// first transaction report the initial balance.
pub fn daily_balance_series(
    initial_balance: Decimal,
    rows: &[Transaction],
    range: &DateRange,
) -> Vec<(NaiveDate, Decimal)> {
    range
        .iter_days()
        .map(|day| {
            let balance = running_balance_at(initial_balance, rows, end_of_day(day));
            (day, balance)
        })
        .collect()
}

/// Credit and debit totals plus the transaction count within the range
pub fn period_statistics(rows: &[Transaction], range: &DateRange) -> PeriodStatistics {
    let mut stats = PeriodStatistics {
        credit_total: Decimal::ZERO,
        debit_total: Decimal::ZERO,
        count: 0,
    };
    for row in rows {
        if !range.contains_instant(row.transaction_at) {
            continue;
        }
        if row.transaction_type.is_credit() {
            stats.credit_total += row.amount;
        } else {
            stats.debit_total += row.amount;
        }
        stats.count += 1;
    }
    stats
}

/// Aggregates transfer volume by counterparty account within the range
///
/// Only internal-transfer rows of the requested direction contribute. The
/// `counterparty` closure resolves a transfer row to the account on the
/// other side; rows it cannot resolve are skipped. Results are sorted by
/// total descending and truncated to `limit`.
pub fn top_counterparties<F>(
    rows: &[Transaction],
    range: &DateRange,
    direction: Direction,
    limit: usize,
    counterparty: F,
) -> Vec<CounterpartySummary>
where
    F: Fn(&Transaction) -> Option<AccountRef>,
{
    let mut totals: Vec<CounterpartySummary> = Vec::new();
    for row in rows {
        if !range.contains_instant(row.transaction_at) || !row.is_transfer_sibling() {
            continue;
        }
        let matches_direction = match direction {
            Direction::Incoming => row.transaction_type.is_credit(),
            Direction::Outgoing => row.transaction_type.is_debit(),
        };
        if !matches_direction {
            continue;
        }
        let Some(other) = counterparty(row) else {
            continue;
        };
        match totals.iter_mut().find(|entry| entry.account == other) {
            Some(entry) => {
                entry.total += row.amount;
                entry.count += 1;
            }
            None => totals.push(CounterpartySummary {
                account: other,
                total: row.amount,
                count: 1,
            }),
        }
    }
    totals.sort_by(|a, b| b.total.cmp(&a.total));
    totals.truncate(limit);
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountKind;
    use crate::balance::{recompute_all, sort_canonical};
    use crate::transaction::{AccountingStatus, TransactionType};
    use chrono::{DateTime, TimeZone, Utc};
    use core_kernel::{TransactionId, TransferReference, UserId};
    use rust_decimal_macros::dec;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn row(id: i64, d: u32, ty: TransactionType, amount: Decimal) -> Transaction {
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
            transaction_at: at(d),
            balance_after: None,
            transfer_reference: None,
            accounting_status: AccountingStatus::ToPost,
            created_at: at(d),
        }
    }

    fn history() -> Vec<Transaction> {
        let mut rows = vec![
            row(1, 2, TransactionType::Deposit, dec!(500)),
            row(2, 5, TransactionType::Withdrawal, dec!(120)),
            row(3, 9, TransactionType::Deposit, dec!(75.50)),
            row(4, 20, TransactionType::Withdrawal, dec!(40)),
        ];
        sort_canonical(&mut rows);
        recompute_all(dec!(100), &mut rows);
        rows
    }

    #[test]
    fn test_balance_history_is_descending_within_range() {
        let rows = history();
        let range = DateRange::new(day(3), day(10)).unwrap();
        let selected = balance_history(&rows, &range);

        let ids: Vec<_> = selected.iter().map(|r| r.id.as_i64()).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn test_daily_series_carries_forward() {
        let rows = history();
        let range = DateRange::new(day(1), day(6)).unwrap();
        let series = daily_balance_series(dec!(100), &rows, &range);

        let balances: Vec<_> = series.iter().map(|(_, b)| *b).collect();
        // Day 1 precedes the first row, days 3-4 carry day 2's value
        assert_eq!(
            balances,
            vec![dec!(100), dec!(600), dec!(600), dec!(600), dec!(480), dec!(480)]
        );
    }

    #[test]
    fn test_period_statistics_totals() {
        let rows = history();
        let range = DateRange::new(day(1), day(31)).unwrap();
        let stats = period_statistics(&rows, &range);

        assert_eq!(stats.credit_total, dec!(575.50));
        assert_eq!(stats.debit_total, dec!(160));
        assert_eq!(stats.count, 4);
    }

    #[test]
    fn test_period_statistics_respects_range() {
        let rows = history();
        let range = DateRange::new(day(4), day(6)).unwrap();
        let stats = period_statistics(&rows, &range);

        assert_eq!(stats.credit_total, dec!(0));
        assert_eq!(stats.debit_total, dec!(120));
        assert_eq!(stats.count, 1);
    }

    #[test]
    fn test_top_counterparties_aggregates_and_sorts() {
        let other_a = AccountRef {
            kind: AccountKind::Principal,
            id: 2,
        };
        let other_b = AccountRef {
            kind: AccountKind::Principal,
            id: 3,
        };
        let reference = TransferReference::generate();
        let mut rows = vec![
            {
                let mut r = row(1, 2, TransactionType::TransferOut, dec!(50));
                r.transfer_reference = Some(reference.clone());
                r
            },
            {
                let mut r = row(2, 3, TransactionType::TransferOut, dec!(30));
                r.transfer_reference = Some(TransferReference::generate());
                r
            },
            {
                let mut r = row(3, 4, TransactionType::TransferOut, dec!(45));
                r.transfer_reference = Some(TransferReference::generate());
                r
            },
            // Plain withdrawal never counts
            row(4, 5, TransactionType::Withdrawal, dec!(500)),
        ];
        sort_canonical(&mut rows);

        let range = DateRange::new(day(1), day(31)).unwrap();
        let resolve = |r: &Transaction| {
            if r.id.as_i64() == 2 {
                Some(other_b)
            } else {
                Some(other_a)
            }
        };
        let top = top_counterparties(&rows, &range, Direction::Outgoing, 5, resolve);

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].account, other_a);
        assert_eq!(top[0].total, dec!(95));
        assert_eq!(top[0].count, 2);
        assert_eq!(top[1].account, other_b);
        assert_eq!(top[1].total, dec!(30));

        let incoming = top_counterparties(&rows, &range, Direction::Incoming, 5, resolve);
        assert!(incoming.is_empty());

        let limited = top_counterparties(&rows, &range, Direction::Outgoing, 1, resolve);
        assert_eq!(limited.len(), 1);
    }
}
