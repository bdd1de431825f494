//! Principal accounts, sub-accounts, and the tagged account selector
//!
//! The source of every ledger operation is the pair (kind, id): a tagged
//! discriminator instead of inheritance. Sub-accounts are savings buckets
//! attached to exactly one principal account.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{BankId, Currency, PrincipalAccountId, SubAccountId, UserId};

use crate::error::LedgerError;

/// Discriminates the two account kinds every ledger operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Principal,
    SubAccount,
}

impl AccountKind {
    /// Returns the persistence column discriminator value
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Principal => "principal",
            AccountKind::SubAccount => "sub_account",
        }
    }
}

impl std::str::FromStr for AccountKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "principal" => Ok(AccountKind::Principal),
            "sub_account" => Ok(AccountKind::SubAccount),
            other => Err(LedgerError::validation(format!(
                "Unknown account kind: {other}"
            ))),
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The (kind, id) pair selecting the owning account of an operation
///
/// Ordered by (kind, id); that order is also the global lock order used when
/// a transfer touches two accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountRef {
    pub kind: AccountKind,
    pub id: i64,
}

impl AccountRef {
    /// Selects a principal account
    pub fn principal(id: PrincipalAccountId) -> Self {
        Self {
            kind: AccountKind::Principal,
            id: id.as_i64(),
        }
    }

    /// Selects a sub-account
    pub fn sub_account(id: SubAccountId) -> Self {
        Self {
            kind: AccountKind::SubAccount,
            id: id.as_i64(),
        }
    }

    pub fn is_principal(&self) -> bool {
        self.kind == AccountKind::Principal
    }

    pub fn is_sub_account(&self) -> bool {
        self.kind == AccountKind::SubAccount
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Type of a principal account held at a bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalAccountType {
    Current,
    Savings,
    Youth,
    Other,
}

impl PrincipalAccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalAccountType::Current => "current",
            PrincipalAccountType::Savings => "savings",
            PrincipalAccountType::Youth => "youth",
            PrincipalAccountType::Other => "other",
        }
    }
}

impl std::str::FromStr for PrincipalAccountType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current" => Ok(PrincipalAccountType::Current),
            "savings" => Ok(PrincipalAccountType::Savings),
            "youth" => Ok(PrincipalAccountType::Youth),
            "other" => Ok(PrincipalAccountType::Other),
            other => Err(LedgerError::validation(format!(
                "Unknown account type: {other}"
            ))),
        }
    }
}

/// A top-level account held at a bank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalAccount {
    /// Store-assigned identifier
    pub id: PrincipalAccountId,
    /// Owning user (opaque key for the core)
    pub owner: UserId,
    /// Bank holding the account
    pub bank_id: BankId,
    /// Display name
    pub display_name: String,
    /// Bank account number
    pub account_number: Option<String>,
    /// IBAN
    pub iban: Option<String>,
    /// BIC
    pub bic: Option<String>,
    /// Account type
    pub account_type: PrincipalAccountType,
    /// Cached current balance, maintained by the balance recomputer
    pub current_balance: Decimal,
    /// Balance at account opening; seed of every balance walk
    pub initial_balance: Decimal,
    /// Account currency
    pub currency: Currency,
    /// Opening date
    pub opened_on: Option<NaiveDate>,
    /// Soft-deactivation flag
    pub active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl PrincipalAccount {
    /// Creates a new principal account with a zero history
    pub fn new(
        id: PrincipalAccountId,
        owner: UserId,
        bank_id: BankId,
        display_name: impl Into<String>,
        account_type: PrincipalAccountType,
        initial_balance: Decimal,
        currency: Currency,
    ) -> Self {
        Self {
            id,
            owner,
            bank_id,
            display_name: display_name.into(),
            account_number: None,
            iban: None,
            bic: None,
            account_type,
            current_balance: initial_balance,
            initial_balance,
            currency,
            opened_on: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Sets the bank coordinates
    pub fn with_coordinates(
        mut self,
        account_number: impl Into<String>,
        iban: impl Into<String>,
        bic: impl Into<String>,
    ) -> Self {
        self.account_number = Some(account_number.into());
        self.iban = Some(iban.into());
        self.bic = Some(bic.into());
        self
    }

    /// Sets the opening date
    pub fn opened_on(mut self, date: NaiveDate) -> Self {
        self.opened_on = Some(date);
        self
    }

    /// The tagged selector for this account
    pub fn account_ref(&self) -> AccountRef {
        AccountRef::principal(self.id)
    }
}

/// A savings bucket attached to exactly one principal account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAccount {
    /// Store-assigned identifier
    pub id: SubAccountId,
    /// Parent principal account
    pub parent_id: PrincipalAccountId,
    /// Display name
    pub display_name: String,
    /// Description
    pub description: Option<String>,
    /// Savings goal, if any
    pub goal_amount: Option<Decimal>,
    /// Target date for the goal
    pub goal_date: Option<NaiveDate>,
    /// Cached current balance, maintained by the balance recomputer
    pub current_balance: Decimal,
    /// Display color
    pub color: Option<String>,
    /// Display icon
    pub icon: Option<String>,
    /// Soft-deactivation flag
    pub active: bool,
}

impl SubAccount {
    /// Creates a new, empty sub-account under the given principal
    pub fn new(id: SubAccountId, parent_id: PrincipalAccountId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            display_name: display_name.into(),
            description: None,
            goal_amount: None,
            goal_date: None,
            current_balance: Decimal::ZERO,
            color: None,
            icon: None,
            active: true,
        }
    }

    /// Sets a savings goal
    pub fn with_goal(mut self, amount: Decimal, date: Option<NaiveDate>) -> Self {
        self.goal_amount = Some(amount);
        self.goal_date = date;
        self
    }

    /// The tagged selector for this sub-account
    pub fn account_ref(&self) -> AccountRef {
        AccountRef::sub_account(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_ref_lock_order() {
        // Principals sort before sub-accounts, then by id
        let a = AccountRef::principal(PrincipalAccountId::new(9));
        let b = AccountRef::sub_account(SubAccountId::new(1));
        let c = AccountRef::principal(PrincipalAccountId::new(2));

        let mut refs = [a, b, c];
        refs.sort();
        assert_eq!(refs, [c, a, b]);
    }

    #[test]
    fn test_account_kind_round_trip() {
        assert_eq!("principal".parse::<AccountKind>().unwrap(), AccountKind::Principal);
        assert_eq!(AccountKind::SubAccount.as_str(), "sub_account");
        assert!("wallet".parse::<AccountKind>().is_err());
    }

    #[test]
    fn test_new_principal_starts_at_initial_balance() {
        let account = PrincipalAccount::new(
            PrincipalAccountId::new(1),
            UserId::new(7),
            BankId::new(1),
            "Everyday",
            PrincipalAccountType::Current,
            dec!(250.00),
            Currency::CHF,
        );
        assert_eq!(account.current_balance, dec!(250.00));
        assert!(account.active);
    }
}
