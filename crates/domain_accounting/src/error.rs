//! Error types for the accounting layer

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::TransactionId;
use domain_ledger::LedgerError;

/// Errors raised by the accounting layer
#[derive(Debug, Error)]
pub enum AccountingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error(
        "Linkage cap exceeded on transaction {transaction}: linked {linked_sum} + entry {entry_amount} > {transaction_amount}"
    )]
    LinkageCapExceeded {
        transaction: TransactionId,
        linked_sum: Decimal,
        entry_amount: Decimal,
        transaction_amount: Decimal,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl AccountingError {
    pub fn validation(message: impl Into<String>) -> Self {
        AccountingError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AccountingError::NotFound(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        AccountingError::PermissionDenied(message.into())
    }
}
