//! Journal entries and the VAT breakdown
//!
//! Entries carry their amount both gross (TTC) and net (HTVA); the split is
//! computed once at creation time from the VAT rate and stored. All derived
//! amounts follow the half-away-from-zero rounding policy.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{
    round_amount, CategoryId, ContactId, JournalEntryId, PrincipalAccountId, Rate, SubAccountId,
    TransactionId, UserId,
};

use crate::error::AccountingError;

/// Expense or income side of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Expense,
    Income,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Expense => "expense",
            EntryType::Income => "income",
        }
    }
}

impl std::str::FromStr for EntryType {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expense" => Ok(EntryType::Expense),
            "income" => Ok(EntryType::Income),
            other => Err(AccountingError::validation(format!(
                "Unknown entry type: {other}"
            ))),
        }
    }
}

/// Review status of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Validated,
    Rejected,
    SoftDeleted,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Validated => "validated",
            EntryStatus::Rejected => "rejected",
            EntryStatus::SoftDeleted => "soft_deleted",
        }
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "validated" => Ok(EntryStatus::Validated),
            "rejected" => Ok(EntryStatus::Rejected),
            "soft_deleted" => Ok(EntryStatus::SoftDeleted),
            other => Err(AccountingError::validation(format!(
                "Unknown entry status: {other}"
            ))),
        }
    }
}

/// Principal entry or auto-generated complementary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Principal,
    Complementary,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Principal => "principal",
            EntryKind::Complementary => "complementary",
        }
    }
}

/// Net amount and VAT share of a gross amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VatBreakdown {
    pub amount_htva: Decimal,
    pub vat_amount: Decimal,
}

/// Splits a gross (TTC) amount into net (HTVA) and VAT
///
/// htva = ttc / (1 + rate); vat = ttc - htva. The net amount is rounded half
/// away from zero, so htva + vat always reproduces the gross amount exactly.
pub fn vat_breakdown(amount_ttc: Decimal, vat_rate: Rate) -> VatBreakdown {
    if vat_rate.is_zero() {
        return VatBreakdown {
            amount_htva: amount_ttc,
            vat_amount: Decimal::ZERO,
        };
    }
    let amount_htva = round_amount(amount_ttc / (dec!(1) + vat_rate.as_decimal()));
    VatBreakdown {
        amount_htva,
        vat_amount: amount_ttc - amount_htva,
    }
}

/// An accounting journal entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Store-assigned identifier
    pub id: JournalEntryId,
    /// Accounting date
    pub entry_date: NaiveDate,
    /// Principal account the entry relates to
    pub principal_account_id: PrincipalAccountId,
    /// Sub-account, when the entry concerns a savings bucket
    pub sub_account_id: Option<SubAccountId>,
    /// Category the entry is filed under
    pub category_id: CategoryId,
    /// Gross amount
    pub amount_ttc: Decimal,
    /// Net amount
    pub amount_htva: Decimal,
    /// VAT rate applied at creation
    pub vat_rate: Rate,
    /// VAT share of the gross amount
    pub vat_amount: Decimal,
    pub description: String,
    /// Counterparty contact, if known
    pub counterparty_contact_id: Option<ContactId>,
    pub reference: Option<String>,
    pub entry_type: EntryType,
    pub owner: UserId,
    pub status: EntryStatus,
    pub entry_kind: EntryKind,
    /// Parent entry; set iff this is a complementary
    pub principal_entry_id: Option<JournalEntryId>,
    /// Linked ledger transaction, if any
    pub transaction_id: Option<TransactionId>,
    /// Set on a complementary that could not be linked because the cap was
    /// already reached
    pub flagged: bool,
}

impl JournalEntry {
    /// Returns true when the entry counts toward linkage sums
    pub fn counts_for_linkage(&self) -> bool {
        self.status != EntryStatus::SoftDeleted
    }

    pub fn is_principal(&self) -> bool {
        self.entry_kind == EntryKind::Principal
    }
}

/// Attributes for creating a principal journal entry
#[derive(Debug, Clone)]
pub struct NewJournalEntry {
    pub entry_date: NaiveDate,
    pub principal_account_id: PrincipalAccountId,
    pub sub_account_id: Option<SubAccountId>,
    pub category_id: CategoryId,
    pub amount_ttc: Decimal,
    pub vat_rate: Rate,
    pub description: String,
    pub counterparty_contact_id: Option<ContactId>,
    pub reference: Option<String>,
    pub entry_type: EntryType,
    pub owner: UserId,
    pub status: EntryStatus,
}

impl NewJournalEntry {
    pub fn new(
        entry_date: NaiveDate,
        principal_account_id: PrincipalAccountId,
        category_id: CategoryId,
        amount_ttc: Decimal,
        entry_type: EntryType,
        owner: UserId,
        description: impl Into<String>,
    ) -> Self {
        Self {
            entry_date,
            principal_account_id,
            sub_account_id: None,
            category_id,
            amount_ttc,
            vat_rate: Rate::new(Decimal::ZERO),
            description: description.into(),
            counterparty_contact_id: None,
            reference: None,
            entry_type,
            owner,
            status: EntryStatus::Pending,
        }
    }

    pub fn with_vat(mut self, rate: Rate) -> Self {
        self.vat_rate = rate;
        self
    }

    pub fn with_sub_account(mut self, sub_account_id: SubAccountId) -> Self {
        self.sub_account_id = Some(sub_account_id);
        self
    }

    pub fn with_counterparty(mut self, contact_id: ContactId) -> Self {
        self.counterparty_contact_id = Some(contact_id);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status = status;
        self
    }

    pub fn validate(&self) -> Result<(), AccountingError> {
        if self.amount_ttc <= Decimal::ZERO {
            return Err(AccountingError::validation(format!(
                "Entry amount must be positive, got {}",
                self.amount_ttc
            )));
        }
        if self.vat_rate.as_decimal() < Decimal::ZERO {
            return Err(AccountingError::validation(
                "VAT rate must not be negative".to_string(),
            ));
        }
        if self.status == EntryStatus::SoftDeleted {
            return Err(AccountingError::validation(
                "Entries cannot be created soft-deleted".to_string(),
            ));
        }
        Ok(())
    }
}

/// Field changes for a principal entry
#[derive(Debug, Clone, Default)]
pub struct JournalEntryUpdate {
    pub new_amount_ttc: Option<Decimal>,
    pub new_vat_rate: Option<Rate>,
    pub new_entry_date: Option<NaiveDate>,
    pub new_description: Option<String>,
    pub new_status: Option<EntryStatus>,
}

impl JournalEntryUpdate {
    pub fn amount_ttc(mut self, amount: Decimal) -> Self {
        self.new_amount_ttc = Some(amount);
        self
    }

    pub fn vat_rate(mut self, rate: Rate) -> Self {
        self.new_vat_rate = Some(rate);
        self
    }

    pub fn entry_date(mut self, date: NaiveDate) -> Self {
        self.new_entry_date = Some(date);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.new_description = Some(description.into());
        self
    }

    pub fn status(mut self, status: EntryStatus) -> Self {
        self.new_status = Some(status);
        self
    }

    /// Returns true when the change invalidates derived amounts
    pub fn affects_amounts(&self) -> bool {
        self.new_amount_ttc.is_some() || self.new_vat_rate.is_some()
    }

    pub fn validate(&self) -> Result<(), AccountingError> {
        if let Some(amount) = self.new_amount_ttc {
            if amount <= Decimal::ZERO {
                return Err(AccountingError::validation(format!(
                    "Entry amount must be positive, got {amount}"
                )));
            }
        }
        if self.new_status == Some(EntryStatus::SoftDeleted) {
            return Err(AccountingError::validation(
                "Use soft_delete to remove an entry".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vat_breakdown_standard_rate() {
        // 8.1% Swiss standard rate on a 108.10 gross amount
        let split = vat_breakdown(dec!(108.10), Rate::from_percentage(dec!(8.1)));
        assert_eq!(split.amount_htva, dec!(100.00));
        assert_eq!(split.vat_amount, dec!(8.10));
    }

    #[test]
    fn test_vat_breakdown_reproduces_gross() {
        let gross = dec!(73.35);
        let split = vat_breakdown(gross, Rate::from_percentage(dec!(2.6)));
        assert_eq!(split.amount_htva + split.vat_amount, gross);
    }

    #[test]
    fn test_zero_rate_has_no_vat() {
        let split = vat_breakdown(dec!(50), Rate::new(Decimal::ZERO));
        assert_eq!(split.amount_htva, dec!(50));
        assert_eq!(split.vat_amount, dec!(0));
    }

    #[test]
    fn test_new_entry_validation() {
        let entry = NewJournalEntry::new(
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            PrincipalAccountId::new(1),
            CategoryId::new(1),
            dec!(0),
            EntryType::Expense,
            UserId::new(1),
            "zero",
        );
        assert!(entry.validate().is_err());

        let entry = NewJournalEntry::new(
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            PrincipalAccountId::new(1),
            CategoryId::new(1),
            dec!(25),
            EntryType::Expense,
            UserId::new(1),
            "ok",
        )
        .with_vat(Rate::from_percentage(dec!(8.1)));
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_update_validation() {
        assert!(JournalEntryUpdate::default()
            .amount_ttc(dec!(-5))
            .validate()
            .is_err());
        assert!(JournalEntryUpdate::default()
            .status(EntryStatus::SoftDeleted)
            .validate()
            .is_err());

        let update = JournalEntryUpdate::default().description("adjusted");
        assert!(update.validate().is_ok());
        assert!(!update.affects_amounts());
    }
}
