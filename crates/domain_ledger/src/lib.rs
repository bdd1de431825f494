//! Banking ledger domain
//!
//! Accounts and sub-accounts, dated transactions with cached running
//! balances, the balance recomputer, the transfer aggregate, period queries,
//! and the in-memory `LedgerBook` engine that enforces the ledger invariants
//! end to end.

pub mod account;
pub mod balance;
pub mod error;
pub mod ledger;
pub mod reporting;
pub mod transaction;
pub mod transfer;

pub use account::{AccountKind, AccountRef, PrincipalAccount, PrincipalAccountType, SubAccount};
pub use balance::{recompute_all, recompute_from, running_balance_at};
pub use error::LedgerError;
pub use ledger::LedgerBook;
pub use reporting::{
    balance_history, daily_balance_series, period_statistics, top_counterparties,
    CounterpartySummary, Direction, PeriodStatistics,
};
pub use transaction::{
    AccountingStatus, NewTransaction, Transaction, TransactionType, TransactionUpdate,
};
pub use transfer::{
    plan_external_reversal, plan_external_transfer, plan_internal_transfer, ExternalTransfer,
    ExternalTransferRequest, ExternalTransferStatus, TransferEndpoint, TransferPlan,
};
