//! Infrastructure Database Layer
//!
//! This crate provides the PostgreSQL persistence for the ledger platform,
//! built on SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern. Repositories hide SQL behind
//! the domain types and run the domain's pure balance and linkage logic
//! inside database transactions, so the cached `balance_after` chain and the
//! accounting statuses stay consistent under concurrency.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, TransactionRepository};
//!
//! let pool = create_pool(config).await?;
//! let repo = TransactionRepository::new(pool);
//! ```

pub mod config;
pub mod error;
pub mod pool;
pub mod repositories;

pub use config::DatabaseSettings;
pub use error::DatabaseError;
pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool};
pub use repositories::{
    AccountRepository, CategoryRepository, JournalRepository, PeriodQueryRepository,
    TransactionRepository, TransferRepository,
};
