//! Ledger domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::account::AccountRef;

/// Errors that can occur in the ledger domain
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Input failed validation (non-positive amount, invalid pair, self-transfer, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Balance check failed on a debit with validation enabled
    #[error("Insufficient funds on {account}: requested {requested}, available {available}")]
    InsufficientFunds {
        account: AccountRef,
        requested: Decimal,
        available: Decimal,
    },

    /// Caller does not own the account or transaction
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Transfer sibling missing or corrupt
    #[error("Conflicting transfer: {0}")]
    ConflictingTransfer(String),

    /// Account or transaction not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Balance walk failed; the enclosing unit must roll back
    #[error("Recompute failure: {0}")]
    Recompute(String),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        LedgerError::NotFound(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        LedgerError::PermissionDenied(message.into())
    }
}
