//! Core Kernel - Foundational types and utilities for the ledger system
//!
//! This crate provides the fundamental building blocks used across all domain
//! modules:
//! - Money types with precise decimal arithmetic
//! - Strongly-typed identifiers and the transfer reference
//! - Temporal helpers for day boundaries and period ranges

pub mod error;
pub mod identifiers;
pub mod money;
pub mod temporal;

pub use error::CoreError;
pub use identifiers::{
    BankId, CategoryId, ContactId, ExternalTransferId, JournalEntryId, PrincipalAccountId,
    SubAccountId, TransactionId, TransferReference, UserId,
};
pub use money::{round_amount, Currency, Money, MoneyError, Rate, AMOUNT_EPSILON};
pub use temporal::{end_of_day, start_of_day, DateRange, TemporalError};
