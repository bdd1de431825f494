//! Custom Test Assertions
//!
//! Specialized assertion helpers for the ledger domain that give more
//! meaningful error messages than standard assertions.

use core_kernel::AMOUNT_EPSILON;
use domain_accounting::JournalEntry;
use domain_ledger::Transaction;
use rust_decimal::Decimal;

/// Asserts that a history's cached balances form a consistent chain
///
/// Every row must carry a `balance_after` equal to the previous row's value
/// plus its own signed amount, seeded from `initial_balance`. The rows must
/// already be in canonical order.
pub fn assert_balance_chain(initial_balance: Decimal, rows: &[Transaction]) {
    let mut running = initial_balance;
    for row in rows {
        running += row.signed_amount();
        match row.balance_after {
            Some(cached) => assert_eq!(
                cached, running,
                "Cached balance of transaction {} is {}, expected {}",
                row.id, cached, running
            ),
            None => panic!("Transaction {} has no cached balance", row.id),
        }
    }
}

/// Asserts that two transactions form a well-paired internal transfer
pub fn assert_transfer_pair(outgoing: &Transaction, incoming: &Transaction) {
    assert!(
        outgoing.transaction_type.is_debit(),
        "Outgoing side must be a debit, got {}",
        outgoing.transaction_type
    );
    assert!(
        incoming.transaction_type.is_credit(),
        "Incoming side must be a credit, got {}",
        incoming.transaction_type
    );
    assert_eq!(
        outgoing.amount, incoming.amount,
        "Transfer sides must carry the same amount"
    );
    assert_eq!(
        outgoing.transfer_reference, incoming.transfer_reference,
        "Transfer sides must share a reference"
    );
    assert!(
        outgoing.transfer_reference.is_some(),
        "Transfer sides must carry a reference"
    );
    assert_ne!(
        outgoing.account, incoming.account,
        "Transfer sides must sit on different accounts"
    );
}

/// Asserts that the linked entries stay within the transaction's amount
///
/// Soft-deleted entries do not count toward the sum.
pub fn assert_linkage_within_cap(transaction: &Transaction, entries: &[JournalEntry]) {
    let sum: Decimal = entries
        .iter()
        .filter(|entry| {
            entry.transaction_id == Some(transaction.id) && entry.counts_for_linkage()
        })
        .map(|entry| entry.amount_ttc)
        .sum();
    assert!(
        sum <= transaction.amount + AMOUNT_EPSILON,
        "Linked sum {} exceeds transaction amount {} beyond tolerance",
        sum,
        transaction.amount
    );
}

/// Asserts that an entry's VAT split sums exactly to its gross amount
pub fn assert_vat_split(entry: &JournalEntry) {
    assert_eq!(
        entry.amount_htva + entry.vat_amount,
        entry.amount_ttc,
        "Net {} plus VAT {} must equal gross {} for entry {}",
        entry.amount_htva,
        entry.vat_amount,
        entry.amount_ttc,
        entry.id
    );
}
