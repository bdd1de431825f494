//! Strongly-typed identifiers for domain entities
//!
//! Identifiers are newtype wrappers around the 64-bit signed integers the
//! store assigns; the wrappers prevent accidental mixing of id kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw store-assigned identifier
            pub fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw identifier value
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

// Ownership and registry identifiers
define_id!(UserId);
define_id!(BankId);
define_id!(ContactId);

// Ledger domain identifiers
define_id!(PrincipalAccountId);
define_id!(SubAccountId);
define_id!(TransactionId);
define_id!(ExternalTransferId);

// Accounting domain identifiers
define_id!(CategoryId);
define_id!(JournalEntryId);

/// Opaque reference joining the two siblings of an internal transfer
///
/// Fresh references are unique across the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferReference(String);

impl TransferReference {
    /// Generates a fresh unique reference
    pub fn generate() -> Self {
        Self(format!("TRF-{}", Uuid::new_v4()))
    }

    /// Wraps an existing reference string
    pub fn from_string(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the reference as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferReference {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}
