//! Integration Tests for the Ledger Platform
//!
//! Cross-crate workflows: the ledger engine, the accounting layer, and the
//! linkage between them. Database-backed versions of the same flows live in
//! the `database_workflows` module and need a running Docker daemon, so they
//! are ignored by default (`cargo test -- --ignored`).

use chrono::{TimeZone, Utc};
use core_kernel::Rate;
use domain_ledger::{AccountingStatus, TransactionType};
use rust_decimal_macros::dec;
use test_utils::{
    assert_balance_chain, assert_transfer_pair, CategoryFixture, JournalEntryBuilder,
    LedgerFixture, TransactionBuilder, UserFixtures,
};

fn on(day: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0)
        .single()
        .expect("valid datetime")
}

mod ledger_workflows {
    use super::*;
    use domain_ledger::{AccountRef, LedgerBook, LedgerError, NewTransaction};

    /// Deposit on an empty account yields one row with a cached balance
    #[test]
    fn deposit_on_empty_account() {
        let mut book = LedgerBook::new();
        let account = AccountRef::principal(book.open_principal(UserFixtures::alice(), dec!(0)));

        book.insert(
            TransactionBuilder::deposit(account).amount(dec!(100.00)).build(),
            false,
        )
        .unwrap();

        assert_eq!(book.current_balance(account).unwrap(), dec!(100.00));
        let rows = book.transactions(account).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].balance_after, Some(dec!(100.00)));
    }

    /// A back-dated deposit reorders the history and shifts every cached
    /// balance after it
    #[test]
    fn back_dated_deposit_rewrites_the_chain() {
        let mut book = LedgerBook::new();
        let account = AccountRef::principal(book.open_principal(UserFixtures::alice(), dec!(0)));
        let alice = UserFixtures::alice();

        book.insert(
            NewTransaction::new(
                account,
                TransactionType::Deposit,
                dec!(200.00),
                "Salary",
                alice,
                on(10),
            ),
            false,
        )
        .unwrap();
        book.insert(
            NewTransaction::new(
                account,
                TransactionType::Withdrawal,
                dec!(50.00),
                "Groceries",
                alice,
                on(12),
            ),
            false,
        )
        .unwrap();
        book.insert(
            NewTransaction::new(
                account,
                TransactionType::Deposit,
                dec!(30.00),
                "Refund",
                alice,
                on(8),
            ),
            false,
        )
        .unwrap();

        assert_eq!(book.current_balance(account).unwrap(), dec!(180.00));
        let rows = book.transactions(account).unwrap();
        let cached: Vec<_> = rows.iter().map(|row| row.balance_after.unwrap()).collect();
        assert_eq!(cached, vec![dec!(30.00), dec!(230.00), dec!(180.00)]);
        assert_balance_chain(dec!(0), rows);
    }

    /// An internal transfer writes a paired credit and debit, and deleting
    /// either side removes both
    #[test]
    fn internal_transfer_round_trip() {
        let mut book = LedgerBook::new();
        let alice = UserFixtures::alice();
        let a1 = AccountRef::principal(book.open_principal(alice, dec!(180.00)));
        let a2 = AccountRef::principal(book.open_principal(alice, dec!(0)));

        let reference = book
            .internal_transfer(alice, a1, a2, dec!(40.00), on(15), "Move to savings")
            .unwrap();

        assert_eq!(book.current_balance(a1).unwrap(), dec!(140.00));
        assert_eq!(book.current_balance(a2).unwrap(), dec!(40.00));
        let outgoing = book.transactions(a1).unwrap().last().cloned().unwrap();
        let incoming = book.transactions(a2).unwrap().last().cloned().unwrap();
        assert_eq!(outgoing.transfer_reference.as_ref(), Some(&reference));
        assert_transfer_pair(&outgoing, &incoming);

        book.delete(alice, incoming.id).unwrap();
        assert_eq!(book.current_balance(a1).unwrap(), dec!(180.00));
        assert_eq!(book.current_balance(a2).unwrap(), dec!(0.00));
        assert!(book.transactions(a1).unwrap().is_empty());
        assert!(book.transactions(a2).unwrap().is_empty());
    }

    /// A rejected withdrawal leaves no row and no balance change
    #[test]
    fn insufficient_funds_writes_nothing() {
        let mut book = LedgerBook::new();
        let account =
            AccountRef::principal(book.open_principal(UserFixtures::alice(), dec!(140.00)));

        let err = book
            .insert(
                TransactionBuilder::withdrawal(account)
                    .amount(dec!(1000.00))
                    .build(),
                true,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        assert_eq!(book.current_balance(account).unwrap(), dec!(140.00));
        assert!(book.transactions(account).unwrap().is_empty());
    }
}

mod accounting_workflows {
    use super::*;
    use domain_accounting::{AccountingError, JournalBook};

    /// Linking entries fills a transaction up to its amount; the overflowing
    /// link is refused and a fitting one flips the status to posted
    #[test]
    fn linkage_cap_and_posting() {
        let mut fixture = LedgerFixture::new();
        let categories = CategoryFixture::new();
        let mut journal = JournalBook::new();
        let account = fixture.alice_ref();

        let tx_id = fixture
            .book
            .insert(
                TransactionBuilder::withdrawal(account)
                    .amount(dec!(100.00))
                    .description("Supplier invoice")
                    .build(),
                false,
            )
            .unwrap();

        journal
            .create(
                &mut fixture.book,
                &categories.registry,
                JournalEntryBuilder::expense(fixture.alice_account, categories.office_supplies)
                    .amount(dec!(60.00))
                    .build(),
                Some(tx_id),
            )
            .unwrap();

        let err = journal
            .create(
                &mut fixture.book,
                &categories.registry,
                JournalEntryBuilder::expense(fixture.alice_account, categories.office_supplies)
                    .amount(dec!(50.00))
                    .build(),
                Some(tx_id),
            )
            .unwrap_err();
        assert!(matches!(err, AccountingError::LinkageCapExceeded { .. }));
        assert_eq!(
            fixture.book.get(tx_id).unwrap().accounting_status,
            AccountingStatus::ToPost
        );

        journal
            .create(
                &mut fixture.book,
                &categories.registry,
                JournalEntryBuilder::expense(fixture.alice_account, categories.office_supplies)
                    .amount(dec!(40.00))
                    .build(),
                Some(tx_id),
            )
            .unwrap();
        assert_eq!(
            fixture.book.get(tx_id).unwrap().accounting_status,
            AccountingStatus::Posted
        );
    }

    /// A complementary-bearing category spawns a second entry at the
    /// configured rate, pointing back at its principal
    #[test]
    fn complementary_entry_creation() {
        let mut fixture = LedgerFixture::new();
        let mut categories = CategoryFixture::new();
        let mut journal = JournalBook::new();

        // Rate 7.7% on the spawning category
        categories
            .registry
            .set_complementary(
                categories.services,
                Some(domain_accounting::ComplementarySpec {
                    target_category_id: categories.vat_receivable,
                    rate: Rate::from_percentage(dec!(7.7)),
                    entry_type: domain_accounting::EntryType::Expense,
                }),
            )
            .unwrap();

        let entry_id = journal
            .create(
                &mut fixture.book,
                &categories.registry,
                JournalEntryBuilder::expense(fixture.alice_account, categories.services)
                    .amount(dec!(107.70))
                    .build(),
                None,
            )
            .unwrap();

        let complementaries = journal.complementaries_of(entry_id);
        assert_eq!(complementaries.len(), 1);
        let complementary = complementaries[0];
        assert_eq!(complementary.amount_ttc, dec!(8.29));
        assert_eq!(complementary.category_id, categories.vat_receivable);
        assert_eq!(complementary.principal_entry_id, Some(entry_id));
    }

    /// VAT split plus linkage: the gross entry amount counts toward the cap
    #[test]
    fn vat_entry_links_at_gross_amount() {
        let mut fixture = LedgerFixture::new();
        let categories = CategoryFixture::new();
        let mut journal = JournalBook::new();
        let account = fixture.alice_ref();

        let tx_id = fixture
            .book
            .insert(
                TransactionBuilder::withdrawal(account)
                    .amount(dec!(108.10))
                    .build(),
                false,
            )
            .unwrap();

        let entry_id = journal
            .create(
                &mut fixture.book,
                &categories.registry,
                JournalEntryBuilder::expense(fixture.alice_account, categories.office_supplies)
                    .amount(dec!(108.10))
                    .vat(Rate::from_percentage(dec!(8.1)))
                    .build(),
                Some(tx_id),
            )
            .unwrap();

        let entry = journal.get(entry_id).unwrap();
        assert_eq!(entry.amount_htva, dec!(100.00));
        assert_eq!(entry.vat_amount, dec!(8.10));
        assert_eq!(journal.linked_sum_for(tx_id), dec!(108.10));
        assert_eq!(
            fixture.book.get(tx_id).unwrap().accounting_status,
            AccountingStatus::Posted
        );
    }
}

mod database_workflows {
    use super::*;
    use core_kernel::{BankId, Currency, PrincipalAccountId};
    use domain_ledger::{AccountRef, PrincipalAccountType};
    use infra_db::{AccountRepository, TransactionRepository, TransferRepository};
    use test_utils::database::create_isolated_test_database;

    /// Deposit, back-dated deposit, and withdrawal against PostgreSQL
    #[tokio::test]
    #[ignore = "requires a running Docker daemon"]
    async fn transaction_lifecycle_against_postgres() {
        let db = create_isolated_test_database().await.unwrap();
        db.seed_users().await.unwrap();
        let pool = db.pool().clone();

        let accounts = AccountRepository::new(pool.clone());
        let transactions = TransactionRepository::new(pool);
        let alice = UserFixtures::alice();

        let principal = accounts
            .create_principal(
                alice,
                BankId::new(1),
                "Current account",
                PrincipalAccountType::Current,
                dec!(0),
                Currency::CHF,
            )
            .await
            .unwrap();
        let account = AccountRef::principal(principal.id);

        transactions
            .insert(
                TransactionBuilder::deposit(account)
                    .amount(dec!(200.00))
                    .at(on(10))
                    .build(),
                false,
            )
            .await
            .unwrap();
        transactions
            .insert(
                TransactionBuilder::withdrawal(account)
                    .amount(dec!(50.00))
                    .at(on(12))
                    .build(),
                true,
            )
            .await
            .unwrap();
        transactions
            .insert(
                TransactionBuilder::deposit(account)
                    .amount(dec!(30.00))
                    .at(on(8))
                    .build(),
                false,
            )
            .await
            .unwrap();

        let rows = transactions.list_for_account(account).await.unwrap();
        let cached: Vec<_> = rows.iter().map(|row| row.balance_after.unwrap()).collect();
        assert_eq!(cached, vec![dec!(30.00), dec!(230.00), dec!(180.00)]);
        assert_eq!(
            accounts.get_principal(principal.id).await.unwrap().current_balance,
            dec!(180.00)
        );
    }

    /// Internal transfer between two accounts against PostgreSQL
    #[tokio::test]
    #[ignore = "requires a running Docker daemon"]
    async fn internal_transfer_against_postgres() {
        let db = create_isolated_test_database().await.unwrap();
        db.seed_users().await.unwrap();
        let pool = db.pool().clone();

        let accounts = AccountRepository::new(pool.clone());
        let transactions = TransactionRepository::new(pool.clone());
        let transfers = TransferRepository::new(pool);
        let alice = UserFixtures::alice();

        let open = |name: &'static str, balance| {
            let accounts = accounts.clone();
            async move {
                accounts
                    .create_principal(
                        alice,
                        BankId::new(1),
                        name,
                        PrincipalAccountType::Current,
                        balance,
                        Currency::CHF,
                    )
                    .await
                    .unwrap()
                    .id
            }
        };
        let a1: PrincipalAccountId = open("Main", dec!(180.00)).await;
        let a2: PrincipalAccountId = open("Savings", dec!(0)).await;
        let source = AccountRef::principal(a1);
        let dest = AccountRef::principal(a2);

        transfers
            .internal_transfer(alice, source, dest, dec!(40.00), on(15), "Move to savings")
            .await
            .unwrap();

        assert_eq!(
            accounts.get_principal(a1).await.unwrap().current_balance,
            dec!(140.00)
        );
        assert_eq!(
            accounts.get_principal(a2).await.unwrap().current_balance,
            dec!(40.00)
        );

        let outgoing = transactions
            .list_for_account(source)
            .await
            .unwrap()
            .pop()
            .unwrap();
        let incoming = transactions
            .list_for_account(dest)
            .await
            .unwrap()
            .pop()
            .unwrap();
        assert_transfer_pair(&outgoing, &incoming);

        // Deleting one side removes both and restores the balances
        transactions.delete(alice, outgoing.id).await.unwrap();
        assert_eq!(
            accounts.get_principal(a1).await.unwrap().current_balance,
            dec!(180.00)
        );
        assert_eq!(
            accounts.get_principal(a2).await.unwrap().current_balance,
            dec!(0.00)
        );
    }
}
