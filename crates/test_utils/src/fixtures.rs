//! Pre-built Test Fixtures
//!
//! Ready-to-use test data for the ledger test suite. Fixtures are
//! deterministic so failures reproduce.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use core_kernel::{CategoryId, DateRange, PrincipalAccountId, Rate, UserId};
use domain_accounting::{CategoryRegistry, CategoryType, ComplementarySpec, EntryType};
use domain_ledger::{AccountRef, LedgerBook};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Fixture for user ids
pub struct UserFixtures;

impl UserFixtures {
    pub fn alice() -> UserId {
        UserId::new(1)
    }

    pub fn bob() -> UserId {
        UserId::new(2)
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Start of the standard test period (Jan 1, 2024)
    pub fn period_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
    }

    /// End of the standard test period (Dec 31, 2024)
    pub fn period_end() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 31).expect("valid date")
    }

    /// The standard test period, the whole of 2024
    pub fn year_2024() -> DateRange {
        DateRange::new(Self::period_start(), Self::period_end()).expect("valid range")
    }

    /// An instant on the given day of January 2024, at noon
    pub fn january(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0)
            .single()
            .expect("valid datetime")
    }

    /// The given day of January 2024
    pub fn january_date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).expect("valid date")
    }
}

/// Fixture for amounts
pub struct AmountFixtures;

impl AmountFixtures {
    pub fn small() -> Decimal {
        dec!(25.00)
    }

    pub fn medium() -> Decimal {
        dec!(250.00)
    }

    pub fn large() -> Decimal {
        dec!(2500.00)
    }

    /// The standard Swiss VAT rate used across accounting tests
    pub fn vat_rate() -> Rate {
        Rate::from_percentage(dec!(8.1))
    }
}

/// A ledger book with one principal account per fixture user
pub struct LedgerFixture {
    pub book: LedgerBook,
    pub alice_account: PrincipalAccountId,
    pub bob_account: PrincipalAccountId,
}

impl LedgerFixture {
    /// Alice starts with 1000.00, Bob with 500.00
    pub fn new() -> Self {
        let mut book = LedgerBook::new();
        let alice_account = book.open_principal(UserFixtures::alice(), dec!(1000.00));
        let bob_account = book.open_principal(UserFixtures::bob(), dec!(500.00));
        Self {
            book,
            alice_account,
            bob_account,
        }
    }

    pub fn alice_ref(&self) -> AccountRef {
        AccountRef::principal(self.alice_account)
    }

    pub fn bob_ref(&self) -> AccountRef {
        AccountRef::principal(self.bob_account)
    }
}

impl Default for LedgerFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A category registry with a minimal chart for Alice
pub struct CategoryFixture {
    pub registry: CategoryRegistry,
    /// Plain expense category, no complementary
    pub office_supplies: CategoryId,
    /// Income category
    pub sales: CategoryId,
    /// Expense category spawning a complementary at the VAT rate
    pub services: CategoryId,
    /// Target of the complementary entries
    pub vat_receivable: CategoryId,
}

impl CategoryFixture {
    pub fn new() -> Self {
        let mut registry = CategoryRegistry::new();
        let owner = UserFixtures::alice();
        let office_supplies = registry.insert(
            owner,
            "6500",
            "Office supplies",
            CategoryType::Expense,
            None,
        );
        let sales = registry.insert(owner, "3200", "Sales", CategoryType::Income, None);
        let vat_receivable = registry.insert(
            owner,
            "1170",
            "VAT receivable",
            CategoryType::Asset,
            None,
        );
        let services = registry.insert(
            owner,
            "6520",
            "External services",
            CategoryType::Expense,
            Some(ComplementarySpec {
                target_category_id: vat_receivable,
                rate: AmountFixtures::vat_rate(),
                entry_type: EntryType::Expense,
            }),
        );
        Self {
            registry,
            office_supplies,
            sales,
            services,
            vat_receivable,
        }
    }
}

impl Default for CategoryFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_fixture_has_funded_accounts() {
        let fixture = LedgerFixture::new();
        assert_eq!(
            fixture.book.current_balance(fixture.alice_ref()).unwrap(),
            dec!(1000.00)
        );
        assert_eq!(
            fixture.book.current_balance(fixture.bob_ref()).unwrap(),
            dec!(500.00)
        );
    }

    #[test]
    fn category_fixture_marks_complementary_bearing() {
        let fixture = CategoryFixture::new();
        let services = fixture.registry.get(fixture.services).unwrap();
        assert!(services.is_complementary_bearing());
        let sales = fixture.registry.get(fixture.sales).unwrap();
        assert!(!sales.is_complementary_bearing());
    }
}
