//! Test Data Builders
//!
//! Builder patterns for constructing test data with sensible defaults, so
//! tests only spell out the fields they care about.

use chrono::{DateTime, NaiveDate, Utc};
use core_kernel::{CategoryId, PrincipalAccountId, Rate, SubAccountId, UserId};
use domain_accounting::{EntryStatus, EntryType, NewJournalEntry};
use domain_ledger::{AccountRef, NewTransaction, TransactionType};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::fixtures::{TemporalFixtures, UserFixtures};

/// Builder for transaction insert requests
pub struct TransactionBuilder {
    account: AccountRef,
    transaction_type: TransactionType,
    amount: Decimal,
    description: String,
    owner: UserId,
    transaction_at: DateTime<Utc>,
    reference: Option<String>,
}

impl TransactionBuilder {
    /// A 100.00 deposit by Alice on Jan 15, 2024
    pub fn deposit(account: AccountRef) -> Self {
        Self {
            account,
            transaction_type: TransactionType::Deposit,
            amount: dec!(100.00),
            description: "Test deposit".to_string(),
            owner: UserFixtures::alice(),
            transaction_at: TemporalFixtures::january(15),
            reference: None,
        }
    }

    /// A 50.00 withdrawal by Alice on Jan 15, 2024
    pub fn withdrawal(account: AccountRef) -> Self {
        Self {
            account,
            transaction_type: TransactionType::Withdrawal,
            amount: dec!(50.00),
            description: "Test withdrawal".to_string(),
            owner: UserFixtures::alice(),
            transaction_at: TemporalFixtures::january(15),
            reference: None,
        }
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn owner(mut self, owner: UserId) -> Self {
        self.owner = owner;
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.transaction_at = at;
        self
    }

    /// Shorthand for a datetime on the given day of January 2024
    pub fn on_january(mut self, day: u32) -> Self {
        self.transaction_at = TemporalFixtures::january(day);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn build(self) -> NewTransaction {
        let mut new = NewTransaction::new(
            self.account,
            self.transaction_type,
            self.amount,
            self.description,
            self.owner,
            self.transaction_at,
        );
        if let Some(reference) = self.reference {
            new = new.with_reference(reference);
        }
        new
    }
}

/// Builder for journal entry insert requests
pub struct JournalEntryBuilder {
    entry_date: NaiveDate,
    principal_account_id: PrincipalAccountId,
    sub_account_id: Option<SubAccountId>,
    category_id: CategoryId,
    amount_ttc: Decimal,
    vat_rate: Rate,
    description: String,
    entry_type: EntryType,
    owner: UserId,
    status: EntryStatus,
}

impl JournalEntryBuilder {
    /// A 100.00 expense entry by Alice on Jan 15, 2024, no VAT
    pub fn expense(principal_account_id: PrincipalAccountId, category_id: CategoryId) -> Self {
        Self {
            entry_date: TemporalFixtures::january_date(15),
            principal_account_id,
            sub_account_id: None,
            category_id,
            amount_ttc: dec!(100.00),
            vat_rate: Rate::new(Decimal::ZERO),
            description: "Test expense".to_string(),
            entry_type: EntryType::Expense,
            owner: UserFixtures::alice(),
            status: EntryStatus::Pending,
        }
    }

    /// A 100.00 income entry by Alice on Jan 15, 2024, no VAT
    pub fn income(principal_account_id: PrincipalAccountId, category_id: CategoryId) -> Self {
        Self {
            entry_type: EntryType::Income,
            description: "Test income".to_string(),
            ..Self::expense(principal_account_id, category_id)
        }
    }

    pub fn amount(mut self, amount_ttc: Decimal) -> Self {
        self.amount_ttc = amount_ttc;
        self
    }

    pub fn vat(mut self, rate: Rate) -> Self {
        self.vat_rate = rate;
        self
    }

    pub fn owner(mut self, owner: UserId) -> Self {
        self.owner = owner;
        self
    }

    pub fn on(mut self, entry_date: NaiveDate) -> Self {
        self.entry_date = entry_date;
        self
    }

    pub fn sub_account(mut self, sub_account_id: SubAccountId) -> Self {
        self.sub_account_id = Some(sub_account_id);
        self
    }

    pub fn status(mut self, status: EntryStatus) -> Self {
        self.status = status;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn build(self) -> NewJournalEntry {
        let mut new = NewJournalEntry::new(
            self.entry_date,
            self.principal_account_id,
            self.category_id,
            self.amount_ttc,
            self.entry_type,
            self.owner,
            self.description,
        )
        .with_vat(self.vat_rate)
        .with_status(self.status);
        if let Some(sub) = self.sub_account_id {
            new = new.with_sub_account(sub);
        }
        new
    }
}
