//! Accounting layer
//!
//! Categories with complementary specifications, journal entries with their
//! VAT breakdown, and the linkage guard tying entries to ledger
//! transactions.

pub mod category;
pub mod entry;
pub mod error;
pub mod journal;
pub mod linkage;

pub use category::{Category, CategoryRegistry, CategoryType, ComplementarySpec};
pub use entry::{
    vat_breakdown, EntryKind, EntryStatus, EntryType, JournalEntry, JournalEntryUpdate,
    NewJournalEntry, VatBreakdown,
};
pub use error::AccountingError;
pub use journal::JournalBook;
pub use linkage::{check_link, derive_status, linked_sum};
