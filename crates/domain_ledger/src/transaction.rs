//! Transaction records and their typed direction
//!
//! Every transaction is a dated money movement on one account. The type
//! alone determines the sign applied to the running balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{TransactionId, TransferReference, UserId};

use crate::account::AccountRef;
use crate::error::LedgerError;

/// Types of ledger transactions
///
/// `AccountToSub` is always the debit sibling and `SubToAccount` always the
/// credit sibling of an intra-principal transfer, whichever direction the
/// money moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Money paid into the account
    Deposit,
    /// Money taken out of the account
    Withdrawal,
    /// Outgoing sibling of an internal transfer
    TransferOut,
    /// Incoming sibling of an internal transfer
    TransferIn,
    /// Debit toward an external beneficiary
    ExternalTransfer,
    /// Credit reversing a cancelled external transfer
    ReversalCredit,
    /// Debit sibling of an intra-principal transfer
    AccountToSub,
    /// Credit sibling of an intra-principal transfer
    SubToAccount,
}

impl TransactionType {
    /// Returns true for types that increase the running balance
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionType::Deposit
                | TransactionType::TransferIn
                | TransactionType::ReversalCredit
                | TransactionType::SubToAccount
        )
    }

    /// Returns true for types that decrease the running balance
    pub fn is_debit(&self) -> bool {
        !self.is_credit()
    }

    /// Applies the direction sign to a positive amount
    pub fn signed(&self, amount: Decimal) -> Decimal {
        if self.is_credit() {
            amount
        } else {
            -amount
        }
    }

    /// Returns true for the siblings of an internal transfer
    pub fn is_internal_transfer(&self) -> bool {
        matches!(
            self,
            TransactionType::TransferOut
                | TransactionType::TransferIn
                | TransactionType::AccountToSub
                | TransactionType::SubToAccount
        )
    }

    /// Returns the persistence column value
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::TransferOut => "transfer_out",
            TransactionType::TransferIn => "transfer_in",
            TransactionType::ExternalTransfer => "external_transfer",
            TransactionType::ReversalCredit => "reversal_credit",
            TransactionType::AccountToSub => "account_to_sub",
            TransactionType::SubToAccount => "sub_to_account",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "transfer_out" => Ok(TransactionType::TransferOut),
            "transfer_in" => Ok(TransactionType::TransferIn),
            "external_transfer" => Ok(TransactionType::ExternalTransfer),
            "reversal_credit" => Ok(TransactionType::ReversalCredit),
            "account_to_sub" => Ok(TransactionType::AccountToSub),
            "sub_to_account" => Ok(TransactionType::SubToAccount),
            other => Err(LedgerError::validation(format!(
                "Unknown transaction type: {other}"
            ))),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Accounting status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountingStatus {
    /// Awaiting journal entries
    ToPost,
    /// Fully covered by linked journal entries
    Posted,
    /// Excluded from accounting; not eligible for linking
    Ignored,
}

impl AccountingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountingStatus::ToPost => "to_post",
            AccountingStatus::Posted => "posted",
            AccountingStatus::Ignored => "ignored",
        }
    }
}

impl std::str::FromStr for AccountingStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to_post" => Ok(AccountingStatus::ToPost),
            "posted" => Ok(AccountingStatus::Posted),
            "ignored" => Ok(AccountingStatus::Ignored),
            other => Err(LedgerError::validation(format!(
                "Unknown accounting status: {other}"
            ))),
        }
    }
}

/// A dated money movement on one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Store-assigned identifier
    pub id: TransactionId,
    /// Owning account (kind, id)
    pub account: AccountRef,
    /// Direction-bearing type
    pub transaction_type: TransactionType,
    /// Positive amount, 2 dp
    pub amount: Decimal,
    /// Description
    pub description: String,
    /// Free-text reference
    pub reference: Option<String>,
    /// Owner of the owning account
    pub owner: UserId,
    /// When the movement happened
    pub transaction_at: DateTime<Utc>,
    /// Cached post-transaction balance; None only mid-recompute
    pub balance_after: Option<Decimal>,
    /// Set on both siblings of an internal transfer
    pub transfer_reference: Option<TransferReference>,
    /// Accounting status
    pub accounting_status: AccountingStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// The signed contribution of this transaction to the running balance
    pub fn signed_amount(&self) -> Decimal {
        self.transaction_type.signed(self.amount)
    }

    /// Returns true if this row is a sibling of an internal transfer
    pub fn is_transfer_sibling(&self) -> bool {
        self.transfer_reference.is_some() && self.transaction_type.is_internal_transfer()
    }
}

/// Data for inserting a new transaction
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account: AccountRef,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub reference: Option<String>,
    pub owner: UserId,
    pub transaction_at: DateTime<Utc>,
    pub transfer_reference: Option<TransferReference>,
}

impl NewTransaction {
    /// Creates an insert request for a simple (non-transfer) transaction
    pub fn new(
        account: AccountRef,
        transaction_type: TransactionType,
        amount: Decimal,
        description: impl Into<String>,
        owner: UserId,
        transaction_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account,
            transaction_type,
            amount,
            description: description.into(),
            reference: None,
            owner,
            transaction_at,
            transfer_reference: None,
        }
    }

    /// Attaches a free-text reference
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Marks this row as one sibling of an internal transfer
    pub fn with_transfer_reference(mut self, reference: TransferReference) -> Self {
        self.transfer_reference = Some(reference);
        self
    }

    /// Validates the request independent of account state
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::validation(format!(
                "Transaction amount must be positive, got {}",
                self.amount
            )));
        }
        if self.transaction_type.is_internal_transfer() && self.transfer_reference.is_none() {
            return Err(LedgerError::validation(
                "Internal transfer rows require a transfer reference".to_string(),
            ));
        }
        Ok(())
    }
}

/// Field changes for an existing transaction
///
/// A change of amount or date triggers a balance recompute from the earlier
/// of the old and new dates; sibling rows of a transfer receive the same
/// changes.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub new_amount: Option<Decimal>,
    pub new_datetime: Option<DateTime<Utc>>,
    pub new_description: Option<String>,
    pub new_reference: Option<String>,
}

impl TransactionUpdate {
    pub fn amount(mut self, amount: Decimal) -> Self {
        self.new_amount = Some(amount);
        self
    }

    pub fn datetime(mut self, at: DateTime<Utc>) -> Self {
        self.new_datetime = Some(at);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.new_description = Some(description.into());
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.new_reference = Some(reference.into());
        self
    }

    /// Returns true when no field is set
    pub fn is_empty(&self) -> bool {
        self.new_amount.is_none()
            && self.new_datetime.is_none()
            && self.new_description.is_none()
            && self.new_reference.is_none()
    }

    /// Returns true when the change requires a balance recompute
    pub fn affects_balance(&self) -> bool {
        self.new_amount.is_some() || self.new_datetime.is_some()
    }

    /// Validates the requested changes
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.is_empty() {
            return Err(LedgerError::validation(
                "Update contains no changes".to_string(),
            ));
        }
        if let Some(amount) = self.new_amount {
            if amount <= Decimal::ZERO {
                return Err(LedgerError::validation(format!(
                    "Transaction amount must be positive, got {amount}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signed_direction() {
        assert_eq!(TransactionType::Deposit.signed(dec!(10)), dec!(10));
        assert_eq!(TransactionType::Withdrawal.signed(dec!(10)), dec!(-10));
        assert_eq!(TransactionType::SubToAccount.signed(dec!(5)), dec!(5));
        assert_eq!(TransactionType::AccountToSub.signed(dec!(5)), dec!(-5));
        assert_eq!(TransactionType::ExternalTransfer.signed(dec!(5)), dec!(-5));
        assert_eq!(TransactionType::ReversalCredit.signed(dec!(5)), dec!(5));
    }

    #[test]
    fn test_type_round_trip() {
        for ty in [
            TransactionType::Deposit,
            TransactionType::Withdrawal,
            TransactionType::TransferOut,
            TransactionType::TransferIn,
            TransactionType::ExternalTransfer,
            TransactionType::ReversalCredit,
            TransactionType::AccountToSub,
            TransactionType::SubToAccount,
        ] {
            assert_eq!(ty.as_str().parse::<TransactionType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_new_transaction_rejects_non_positive_amount() {
        let request = NewTransaction::new(
            crate::account::AccountRef {
                kind: crate::account::AccountKind::Principal,
                id: 1,
            },
            TransactionType::Deposit,
            dec!(0),
            "zero",
            UserId::new(1),
            Utc::now(),
        );
        assert!(matches!(
            request.validate(),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_transfer_row_requires_reference() {
        let request = NewTransaction::new(
            crate::account::AccountRef {
                kind: crate::account::AccountKind::Principal,
                id: 1,
            },
            TransactionType::TransferOut,
            dec!(10),
            "missing ref",
            UserId::new(1),
            Utc::now(),
        );
        assert!(request.validate().is_err());
        let request = request.with_transfer_reference(TransferReference::generate());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_update_validation() {
        assert!(TransactionUpdate::default().validate().is_err());
        assert!(TransactionUpdate::default().amount(dec!(-1)).validate().is_err());

        let update = TransactionUpdate::default().description("groceries");
        assert!(update.validate().is_ok());
        assert!(!update.affects_balance());

        let update = TransactionUpdate::default().amount(dec!(12.50));
        assert!(update.affects_balance());
    }
}
