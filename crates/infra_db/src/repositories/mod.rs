//! Repository implementations for the ledger and accounting aggregates
//!
//! Each repository maps between database rows and domain types and reuses
//! the pure domain functions (balance walks, transfer planning, linkage
//! guard) inside SQL transactions.
//!
//! # Architecture
//!
//! - Every mutation runs in one SQL transaction
//! - Account rows are locked `FOR UPDATE` before history is touched
//! - Multi-account operations lock accounts in global (kind, id) order

pub mod accounts;
pub mod categories;
pub mod journal;
pub mod periods;
pub mod transactions;
pub mod transfers;

pub use accounts::AccountRepository;
pub use categories::CategoryRepository;
pub use journal::JournalRepository;
pub use periods::PeriodQueryRepository;
pub use transactions::TransactionRepository;
pub use transfers::TransferRepository;
