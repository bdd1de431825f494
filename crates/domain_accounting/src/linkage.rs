//! Linkage guard
//!
//! Enforces the cap invariant: for every transaction, the sum of linked,
//! non-soft-deleted journal entries never exceeds the transaction amount.
//! Comparisons carry a half-cent tolerance so VAT rounding residue cannot
//! block an otherwise exact link.
//!
//! The guard derives everything by query over the entry set; it keeps no
//! state of its own.

use rust_decimal::Decimal;

use core_kernel::{TransactionId, AMOUNT_EPSILON};
use domain_ledger::{AccountingStatus, Transaction};

use crate::entry::JournalEntry;
use crate::error::AccountingError;

/// Sum of entries linked to the transaction, soft-deleted excluded
pub fn linked_sum<'a, I>(entries: I, transaction: TransactionId) -> Decimal
where
    I: IntoIterator<Item = &'a JournalEntry>,
{
    entries
        .into_iter()
        .filter(|entry| entry.transaction_id == Some(transaction) && entry.counts_for_linkage())
        .map(|entry| entry.amount_ttc)
        .sum()
}

/// Checks whether an entry of the given amount may link to the transaction
///
/// Fails when the owners differ, when the transaction is ignored, or when
/// the cap would be exceeded.
pub fn check_link(
    entry_amount: Decimal,
    entry_owner: core_kernel::UserId,
    transaction: &Transaction,
    current_linked_sum: Decimal,
) -> Result<(), AccountingError> {
    if transaction.owner != entry_owner {
        return Err(AccountingError::permission_denied(format!(
            "Entry owner {entry_owner} does not match transaction owner {}",
            transaction.owner
        )));
    }
    if transaction.accounting_status == AccountingStatus::Ignored {
        return Err(AccountingError::validation(format!(
            "Transaction {} is ignored and not eligible for linking",
            transaction.id
        )));
    }
    if current_linked_sum + entry_amount > transaction.amount + AMOUNT_EPSILON {
        return Err(AccountingError::LinkageCapExceeded {
            transaction: transaction.id,
            linked_sum: current_linked_sum,
            entry_amount,
            transaction_amount: transaction.amount,
        });
    }
    Ok(())
}

/// The accounting status implied by a linked sum
///
/// `posted` when the sum matches the transaction amount within tolerance,
/// `to_post` otherwise. Never yields `ignored`; that status is a manual
/// override the derivation must not overwrite.
pub fn derive_status(linked_sum: Decimal, transaction_amount: Decimal) -> AccountingStatus {
    if (transaction_amount - linked_sum).abs() <= AMOUNT_EPSILON {
        AccountingStatus::Posted
    } else {
        AccountingStatus::ToPost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_kernel::{TransactionId, UserId};
    use domain_ledger::{AccountRef, TransactionType};
    use rust_decimal_macros::dec;

    fn transaction(amount: Decimal, status: AccountingStatus) -> Transaction {
        Transaction {
            id: TransactionId::new(1),
            account: AccountRef::principal(core_kernel::PrincipalAccountId::new(1)),
            transaction_type: TransactionType::Withdrawal,
            amount,
            description: String::new(),
            reference: None,
            owner: UserId::new(1),
            transaction_at: Utc::now(),
            balance_after: None,
            transfer_reference: None,
            accounting_status: status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_cap_is_enforced() {
        let tx = transaction(dec!(100), AccountingStatus::ToPost);

        assert!(check_link(dec!(60), UserId::new(1), &tx, dec!(0)).is_ok());
        assert!(matches!(
            check_link(dec!(50), UserId::new(1), &tx, dec!(60)),
            Err(AccountingError::LinkageCapExceeded { .. })
        ));
        assert!(check_link(dec!(40), UserId::new(1), &tx, dec!(60)).is_ok());
    }

    #[test]
    fn test_epsilon_tolerates_rounding_residue() {
        let tx = transaction(dec!(100), AccountingStatus::ToPost);
        // Half a cent over is tolerated, a full cent is not
        assert!(check_link(dec!(40.005), UserId::new(1), &tx, dec!(60)).is_ok());
        assert!(check_link(dec!(40.01), UserId::new(1), &tx, dec!(60)).is_err());
    }

    #[test]
    fn test_owner_mismatch_is_refused() {
        let tx = transaction(dec!(100), AccountingStatus::ToPost);
        assert!(matches!(
            check_link(dec!(10), UserId::new(2), &tx, dec!(0)),
            Err(AccountingError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_ignored_transactions_are_not_linkable() {
        let tx = transaction(dec!(100), AccountingStatus::Ignored);
        assert!(check_link(dec!(10), UserId::new(1), &tx, dec!(0)).is_err());
    }

    #[test]
    fn test_derive_status() {
        assert_eq!(derive_status(dec!(100), dec!(100)), AccountingStatus::Posted);
        assert_eq!(derive_status(dec!(99.996), dec!(100)), AccountingStatus::Posted);
        assert_eq!(derive_status(dec!(60), dec!(100)), AccountingStatus::ToPost);
        assert_eq!(derive_status(dec!(0), dec!(100)), AccountingStatus::ToPost);
    }
}
