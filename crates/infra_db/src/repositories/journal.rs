//! Journal entry repository
//!
//! Persists principal entries and their auto-generated complementaries, and
//! keeps linked transactions' accounting status in step through the linkage
//! guard. Creation, linking, and deletion each run in one transactional
//! unit; the linked transaction row is locked while linkage sums are
//! checked.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::debug;

use core_kernel::{
    CategoryId, ContactId, JournalEntryId, PrincipalAccountId, Rate, SubAccountId, TransactionId,
    UserId,
};
use domain_accounting::{
    check_link, derive_status, vat_breakdown, AccountingError, EntryKind, EntryStatus, EntryType,
    JournalEntry, JournalEntryUpdate, NewJournalEntry,
};
use domain_ledger::{AccountingStatus, Transaction};

use crate::error::DatabaseError;
use crate::repositories::categories::CategoryRepository;
use crate::repositories::transactions::TransactionRow;

#[derive(Debug, sqlx::FromRow)]
struct JournalEntryRow {
    id: i64,
    entry_date: NaiveDate,
    principal_account_id: i64,
    sub_account_id: Option<i64>,
    category_id: i64,
    amount_ttc: Decimal,
    amount_htva: Decimal,
    vat_rate: Decimal,
    vat_amount: Decimal,
    description: String,
    counterparty_contact_id: Option<i64>,
    reference: Option<String>,
    entry_type: String,
    owner_user_id: i64,
    status: String,
    entry_kind: String,
    principal_entry_id: Option<i64>,
    transaction_id: Option<i64>,
    flagged: bool,
}

impl JournalEntryRow {
    fn into_domain(self) -> Result<JournalEntry, DatabaseError> {
        let entry_kind = match self.entry_kind.as_str() {
            "principal" => EntryKind::Principal,
            "complementary" => EntryKind::Complementary,
            other => {
                return Err(DatabaseError::ConstraintViolation(format!(
                    "Unknown entry kind: {other}"
                )))
            }
        };
        Ok(JournalEntry {
            id: JournalEntryId::new(self.id),
            entry_date: self.entry_date,
            principal_account_id: PrincipalAccountId::new(self.principal_account_id),
            sub_account_id: self.sub_account_id.map(SubAccountId::new),
            category_id: CategoryId::new(self.category_id),
            amount_ttc: self.amount_ttc,
            amount_htva: self.amount_htva,
            vat_rate: Rate::from_percentage(self.vat_rate),
            vat_amount: self.vat_amount,
            description: self.description,
            counterparty_contact_id: self.counterparty_contact_id.map(ContactId::new),
            reference: self.reference,
            entry_type: self
                .entry_type
                .parse::<EntryType>()
                .map_err(DatabaseError::Accounting)?,
            owner: UserId::new(self.owner_user_id),
            status: self
                .status
                .parse::<EntryStatus>()
                .map_err(DatabaseError::Accounting)?,
            entry_kind,
            principal_entry_id: self.principal_entry_id.map(JournalEntryId::new),
            transaction_id: self.transaction_id.map(TransactionId::new),
            flagged: self.flagged,
        })
    }
}

const ENTRY_COLUMNS: &str = "id, entry_date, principal_account_id, sub_account_id, category_id, \
     amount_ttc, amount_htva, vat_rate, vat_amount, description, counterparty_contact_id, \
     reference, entry_type, owner_user_id, status, entry_kind, principal_entry_id, \
     transaction_id, flagged";

const TRANSACTION_COLUMNS: &str = "id, principal_account_id, sub_account_id, transaction_type, \
     amount, description, reference, owner_user_id, transaction_at, balance_after, \
     transfer_reference, accounting_status, created_at";

async fn lock_transaction(
    conn: &mut PgConnection,
    id: TransactionId,
) -> Result<Transaction, DatabaseError> {
    let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1 FOR UPDATE");
    let row: Option<TransactionRow> = sqlx::query_as(&sql)
        .bind(id.as_i64())
        .fetch_optional(&mut *conn)
        .await?;
    row.ok_or_else(|| DatabaseError::not_found("Transaction", id))?
        .into_domain()
}

async fn linked_sum(
    conn: &mut PgConnection,
    transaction: TransactionId,
) -> Result<Decimal, DatabaseError> {
    let (sum,): (Decimal,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount_ttc), 0) FROM journal_entries \
         WHERE transaction_id = $1 AND status <> 'soft_deleted'",
    )
    .bind(transaction.as_i64())
    .fetch_one(&mut *conn)
    .await?;
    Ok(sum)
}

/// Re-derives a linked transaction's accounting status from the linkage sum;
/// manual `ignored` overrides are left alone
async fn refresh_status(
    conn: &mut PgConnection,
    transaction: TransactionId,
) -> Result<(), DatabaseError> {
    let tx = lock_transaction(&mut *conn, transaction).await?;
    if tx.accounting_status == AccountingStatus::Ignored {
        return Ok(());
    }
    let status = derive_status(linked_sum(&mut *conn, transaction).await?, tx.amount);
    sqlx::query("UPDATE transactions SET accounting_status = $2 WHERE id = $1")
        .bind(transaction.as_i64())
        .bind(status.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

struct EntryInsert<'a> {
    entry_date: NaiveDate,
    principal_account_id: PrincipalAccountId,
    sub_account_id: Option<SubAccountId>,
    category_id: CategoryId,
    amount_ttc: Decimal,
    amount_htva: Decimal,
    vat_rate: Rate,
    vat_amount: Decimal,
    description: &'a str,
    counterparty_contact_id: Option<ContactId>,
    reference: Option<&'a str>,
    entry_type: EntryType,
    owner: UserId,
    status: EntryStatus,
    entry_kind: EntryKind,
    principal_entry_id: Option<JournalEntryId>,
    transaction_id: Option<TransactionId>,
    flagged: bool,
}

async fn insert_entry(
    conn: &mut PgConnection,
    entry: EntryInsert<'_>,
) -> Result<JournalEntryId, DatabaseError> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO journal_entries (
            entry_date, principal_account_id, sub_account_id, category_id,
            amount_ttc, amount_htva, vat_rate, vat_amount, description,
            counterparty_contact_id, reference, entry_type, owner_user_id,
            status, entry_kind, principal_entry_id, transaction_id, flagged
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                  $15, $16, $17, $18)
        RETURNING id
        "#,
    )
    .bind(entry.entry_date)
    .bind(entry.principal_account_id.as_i64())
    .bind(entry.sub_account_id.map(|id| id.as_i64()))
    .bind(entry.category_id.as_i64())
    .bind(entry.amount_ttc)
    .bind(entry.amount_htva)
    .bind(entry.vat_rate.as_percentage())
    .bind(entry.vat_amount)
    .bind(entry.description)
    .bind(entry.counterparty_contact_id.map(|id| id.as_i64()))
    .bind(entry.reference)
    .bind(entry.entry_type.as_str())
    .bind(entry.owner.as_i64())
    .bind(entry.status.as_str())
    .bind(entry.entry_kind.as_str())
    .bind(entry.principal_entry_id.map(|id| id.as_i64()))
    .bind(entry.transaction_id.map(|id| id.as_i64()))
    .bind(entry.flagged)
    .fetch_one(&mut *conn)
    .await?;
    Ok(JournalEntryId::new(id))
}

/// Repository for journal entries
#[derive(Debug, Clone)]
pub struct JournalRepository {
    pool: PgPool,
    categories: CategoryRepository,
}

impl JournalRepository {
    pub fn new(pool: PgPool) -> Self {
        let categories = CategoryRepository::new(pool.clone());
        Self { pool, categories }
    }

    pub async fn get(&self, id: JournalEntryId) -> Result<JournalEntry, DatabaseError> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = $1");
        let row: Option<JournalEntryRow> = sqlx::query_as(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| DatabaseError::not_found("Journal entry", id))?
            .into_domain()
    }

    /// Entries linked to a transaction, soft-deleted included
    pub async fn entries_for_transaction(
        &self,
        transaction: TransactionId,
    ) -> Result<Vec<JournalEntry>, DatabaseError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE transaction_id = $1 ORDER BY id"
        );
        let rows: Vec<JournalEntryRow> = sqlx::query_as(&sql)
            .bind(transaction.as_i64())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(JournalEntryRow::into_domain).collect()
    }

    async fn complementaries_of(
        &self,
        conn: &mut PgConnection,
        principal: JournalEntryId,
    ) -> Result<Vec<JournalEntry>, DatabaseError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries \
             WHERE principal_entry_id = $1 ORDER BY id"
        );
        let rows: Vec<JournalEntryRow> = sqlx::query_as(&sql)
            .bind(principal.as_i64())
            .fetch_all(&mut *conn)
            .await?;
        rows.into_iter().map(JournalEntryRow::into_domain).collect()
    }

    /// Creates a principal entry, its complementary if the category bears
    /// one, and the requested transaction link
    ///
    /// A failing link aborts the whole create; a complementary that no
    /// longer fits under the cap is created unlinked and flagged.
    pub async fn create(
        &self,
        new: NewJournalEntry,
        link_transaction_id: Option<TransactionId>,
    ) -> Result<JournalEntryId, DatabaseError> {
        new.validate().map_err(DatabaseError::Accounting)?;
        let category = self.categories.get(new.category_id).await?;
        if category.owner != new.owner {
            return Err(AccountingError::permission_denied(format!(
                "Category {} belongs to another user",
                new.category_id
            ))
            .into());
        }

        let mut tx = self.pool.begin().await?;

        if let Some(transaction) = link_transaction_id {
            let locked = lock_transaction(&mut tx, transaction).await?;
            let sum = linked_sum(&mut tx, transaction).await?;
            check_link(new.amount_ttc, new.owner, &locked, sum)
                .map_err(DatabaseError::Accounting)?;
        }

        let split = vat_breakdown(new.amount_ttc, new.vat_rate);
        let id = insert_entry(
            &mut tx,
            EntryInsert {
                entry_date: new.entry_date,
                principal_account_id: new.principal_account_id,
                sub_account_id: new.sub_account_id,
                category_id: new.category_id,
                amount_ttc: new.amount_ttc,
                amount_htva: split.amount_htva,
                vat_rate: new.vat_rate,
                vat_amount: split.vat_amount,
                description: &new.description,
                counterparty_contact_id: new.counterparty_contact_id,
                reference: new.reference.as_deref(),
                entry_type: new.entry_type,
                owner: new.owner,
                status: new.status,
                entry_kind: EntryKind::Principal,
                principal_entry_id: None,
                transaction_id: link_transaction_id,
                flagged: false,
            },
        )
        .await?;

        if let Some(spec) = category.complementary {
            let amount = spec.rate.apply(new.amount_ttc);
            let mut linked = None;
            let mut flagged = false;
            if let Some(transaction) = link_transaction_id {
                let locked = lock_transaction(&mut tx, transaction).await?;
                let sum = linked_sum(&mut tx, transaction).await?;
                match check_link(amount, new.owner, &locked, sum) {
                    Ok(()) => linked = Some(transaction),
                    Err(AccountingError::LinkageCapExceeded { .. }) => flagged = true,
                    Err(err) => return Err(err.into()),
                }
            }
            let description = format!("Complementary: {}", new.description);
            insert_entry(
                &mut tx,
                EntryInsert {
                    entry_date: new.entry_date,
                    principal_account_id: new.principal_account_id,
                    sub_account_id: new.sub_account_id,
                    category_id: spec.target_category_id,
                    amount_ttc: amount,
                    amount_htva: amount,
                    vat_rate: Rate::new(Decimal::ZERO),
                    vat_amount: Decimal::ZERO,
                    description: &description,
                    counterparty_contact_id: new.counterparty_contact_id,
                    reference: new.reference.as_deref(),
                    entry_type: spec.entry_type,
                    owner: new.owner,
                    status: new.status,
                    entry_kind: EntryKind::Complementary,
                    principal_entry_id: Some(id),
                    transaction_id: linked,
                    flagged,
                },
            )
            .await?;
        }

        if let Some(transaction) = link_transaction_id {
            refresh_status(&mut tx, transaction).await?;
        }

        tx.commit().await?;
        debug!(%id, "created journal entry");
        Ok(id)
    }

    /// Modifies a principal entry; complementaries are recomputed when the
    /// amount or VAT rate changes
    pub async fn update(
        &self,
        caller: UserId,
        id: JournalEntryId,
        update: JournalEntryUpdate,
    ) -> Result<(), DatabaseError> {
        update.validate().map_err(DatabaseError::Accounting)?;
        let entry = self.get(id).await?;
        if entry.owner != caller {
            return Err(AccountingError::permission_denied(format!(
                "{caller} does not own entry {id}"
            ))
            .into());
        }
        if !entry.is_principal() {
            return Err(AccountingError::validation(
                "Complementary entries are recomputed from their principal".to_string(),
            )
            .into());
        }
        if entry.status == EntryStatus::SoftDeleted {
            return Err(
                AccountingError::validation(format!("Entry {id} is soft-deleted")).into(),
            );
        }

        let mut tx = self.pool.begin().await?;

        let new_amount = update.new_amount_ttc.unwrap_or(entry.amount_ttc);
        if let Some(transaction) = entry.transaction_id {
            if update.new_amount_ttc.is_some() {
                let locked = lock_transaction(&mut tx, transaction).await?;
                let sum_without = linked_sum(&mut tx, transaction).await? - entry.amount_ttc;
                check_link(new_amount, caller, &locked, sum_without)
                    .map_err(DatabaseError::Accounting)?;
            }
        }

        let rate = update.new_vat_rate.unwrap_or(entry.vat_rate);
        let split = vat_breakdown(new_amount, rate);
        sqlx::query(
            r#"
            UPDATE journal_entries SET
                entry_date = COALESCE($2, entry_date),
                description = COALESCE($3, description),
                status = COALESCE($4, status),
                amount_ttc = $5,
                amount_htva = $6,
                vat_rate = $7,
                vat_amount = $8
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(update.new_entry_date)
        .bind(update.new_description.as_deref())
        .bind(update.new_status.map(|s| s.as_str()))
        .bind(new_amount)
        .bind(split.amount_htva)
        .bind(rate.as_percentage())
        .bind(split.vat_amount)
        .execute(&mut *tx)
        .await?;

        if update.affects_amounts() {
            // Recompute complementaries from the category's current spec
            if let Some(spec) = self.categories.get(entry.category_id).await?.complementary {
                let amount = spec.rate.apply(new_amount);
                sqlx::query(
                    "UPDATE journal_entries SET amount_ttc = $2, amount_htva = $2 \
                     WHERE principal_entry_id = $1",
                )
                .bind(id.as_i64())
                .bind(amount)
                .execute(&mut *tx)
                .await?;
            }
        }

        if let Some(transaction) = entry.transaction_id {
            refresh_status(&mut tx, transaction).await?;
        }

        tx.commit().await?;
        debug!(%id, "updated journal entry");
        Ok(())
    }

    /// Soft-deletes an entry, cascading to its complementaries, and
    /// re-derives the affected transactions' statuses
    pub async fn soft_delete(
        &self,
        caller: UserId,
        id: JournalEntryId,
    ) -> Result<(), DatabaseError> {
        let entry = self.get(id).await?;
        if entry.owner != caller {
            return Err(AccountingError::permission_denied(format!(
                "{caller} does not own entry {id}"
            ))
            .into());
        }

        let mut tx = self.pool.begin().await?;
        let cascade = self.complementaries_of(&mut tx, id).await?;

        sqlx::query(
            "UPDATE journal_entries SET status = 'soft_deleted' \
             WHERE id = $1 OR principal_entry_id = $1",
        )
        .bind(id.as_i64())
        .execute(&mut *tx)
        .await?;

        let mut affected: Vec<TransactionId> = entry.transaction_id.into_iter().collect();
        affected.extend(cascade.iter().filter_map(|entry| entry.transaction_id));
        affected.sort();
        affected.dedup();
        for transaction in affected {
            refresh_status(&mut tx, transaction).await?;
        }

        tx.commit().await?;
        debug!(%id, "soft-deleted journal entry");
        Ok(())
    }

    /// Permanently removes an entry and its complementaries
    ///
    /// Refused while the entry or any complementary is still linked.
    pub async fn hard_delete(
        &self,
        caller: UserId,
        id: JournalEntryId,
    ) -> Result<(), DatabaseError> {
        let entry = self.get(id).await?;
        if entry.owner != caller {
            return Err(AccountingError::permission_denied(format!(
                "{caller} does not own entry {id}"
            ))
            .into());
        }

        let mut tx = self.pool.begin().await?;
        let (linked,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM journal_entries \
             WHERE (id = $1 OR principal_entry_id = $1) AND transaction_id IS NOT NULL",
        )
        .bind(id.as_i64())
        .fetch_one(&mut *tx)
        .await?;
        if linked > 0 {
            return Err(AccountingError::validation(format!(
                "Entry {id} is linked; unlink before hard delete"
            ))
            .into());
        }
        sqlx::query("DELETE FROM journal_entries WHERE id = $1 OR principal_entry_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Links an entry to a transaction, guarded by the cap
    pub async fn link(
        &self,
        entry_id: JournalEntryId,
        transaction: TransactionId,
    ) -> Result<(), DatabaseError> {
        let entry = self.get(entry_id).await?;
        if entry.status == EntryStatus::SoftDeleted {
            return Err(AccountingError::validation(format!(
                "Entry {entry_id} is soft-deleted"
            ))
            .into());
        }
        if entry.transaction_id.is_some() {
            return Err(AccountingError::validation(format!(
                "Entry {entry_id} is already linked"
            ))
            .into());
        }

        let mut tx = self.pool.begin().await?;
        let locked = lock_transaction(&mut tx, transaction).await?;
        let sum = linked_sum(&mut tx, transaction).await?;
        check_link(entry.amount_ttc, entry.owner, &locked, sum)
            .map_err(DatabaseError::Accounting)?;

        sqlx::query(
            "UPDATE journal_entries SET transaction_id = $2, flagged = FALSE WHERE id = $1",
        )
        .bind(entry_id.as_i64())
        .bind(transaction.as_i64())
        .execute(&mut *tx)
        .await?;
        refresh_status(&mut tx, transaction).await?;

        tx.commit().await?;
        debug!(%entry_id, %transaction, "linked journal entry");
        Ok(())
    }

    /// Clears an entry's link and re-derives the transaction's status
    pub async fn unlink(&self, entry_id: JournalEntryId) -> Result<(), DatabaseError> {
        let entry = self.get(entry_id).await?;
        let transaction = entry.transaction_id.ok_or_else(|| {
            DatabaseError::Accounting(AccountingError::validation(format!(
                "Entry {entry_id} is not linked"
            )))
        })?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE journal_entries SET transaction_id = NULL WHERE id = $1")
            .bind(entry_id.as_i64())
            .execute(&mut *tx)
            .await?;
        refresh_status(&mut tx, transaction).await?;
        tx.commit().await?;

        debug!(%entry_id, "unlinked journal entry");
        Ok(())
    }
}
