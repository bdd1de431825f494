//! Ledger Core - umbrella crate for the banking ledger and accounting layer
//!
//! Re-exports the domain crates so embedders can depend on a single crate:
//! - `core_kernel`: money, identifiers, temporal helpers
//! - `domain_ledger`: accounts, transactions, balance recomputation, transfers
//! - `domain_accounting`: categories, journal entries, linkage guard

pub use core_kernel;
pub use domain_accounting;
pub use domain_ledger;
