//! Transaction repository
//!
//! Every mutation runs in one SQL transaction: the owning account row is
//! locked `FOR UPDATE`, the change is applied, and the balance recomputer
//! walks the history from the affected date before the unit commits. The
//! walk itself is the pure domain walk; this module only feeds and persists
//! it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::debug;

use core_kernel::{PrincipalAccountId, TransactionId, TransferReference, UserId};
use domain_ledger::{
    recompute_from, running_balance_at, AccountKind, AccountRef, AccountingStatus, LedgerError,
    NewTransaction, Transaction, TransactionUpdate,
};

use crate::error::DatabaseError;

/// Account fields needed by the mutation path, read under lock
#[derive(Debug, Clone, Copy)]
pub(crate) struct AccountMeta {
    pub owner: UserId,
    pub initial_balance: Decimal,
    pub active: bool,
    /// Parent principal for sub-accounts
    pub parent: Option<PrincipalAccountId>,
}

/// Raw transactions row
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TransactionRow {
    pub id: i64,
    pub principal_account_id: Option<i64>,
    pub sub_account_id: Option<i64>,
    pub transaction_type: String,
    pub amount: Decimal,
    pub description: String,
    pub reference: Option<String>,
    pub owner_user_id: i64,
    pub transaction_at: DateTime<Utc>,
    pub balance_after: Option<Decimal>,
    pub transfer_reference: Option<String>,
    pub accounting_status: String,
    pub created_at: DateTime<Utc>,
}

impl TransactionRow {
    pub(crate) fn into_domain(self) -> Result<Transaction, DatabaseError> {
        let account = match (self.principal_account_id, self.sub_account_id) {
            (Some(id), None) => AccountRef {
                kind: AccountKind::Principal,
                id,
            },
            (None, Some(id)) => AccountRef {
                kind: AccountKind::SubAccount,
                id,
            },
            _ => {
                return Err(DatabaseError::ConstraintViolation(format!(
                    "Transaction {} must reference exactly one account",
                    self.id
                )))
            }
        };
        Ok(Transaction {
            id: TransactionId::new(self.id),
            account,
            transaction_type: self.transaction_type.parse().map_err(LedgerError::from)?,
            amount: self.amount,
            description: self.description,
            reference: self.reference,
            owner: UserId::new(self.owner_user_id),
            transaction_at: self.transaction_at,
            balance_after: self.balance_after,
            transfer_reference: self.transfer_reference.map(TransferReference::from_string),
            accounting_status: self.accounting_status.parse().map_err(LedgerError::from)?,
            created_at: self.created_at,
        })
    }
}

/// Locks the account row and returns the fields the mutation path needs
///
/// For sub-accounts both the bucket row and the parent principal row are
/// locked, so intra-principal transfers serialize on the parent.
pub(crate) async fn lock_account(
    conn: &mut PgConnection,
    account: AccountRef,
) -> Result<AccountMeta, DatabaseError> {
    match account.kind {
        AccountKind::Principal => {
            let row: Option<(i64, Decimal, bool)> = sqlx::query_as(
                r#"
                SELECT owner_user_id, initial_balance, active
                FROM principal_accounts
                WHERE id = $1
                FOR UPDATE
                "#,
            )
            .bind(account.id)
            .fetch_optional(&mut *conn)
            .await?;
            let (owner, initial_balance, active) = row
                .ok_or_else(|| DatabaseError::not_found("Principal account", account.id))?;
            Ok(AccountMeta {
                owner: UserId::new(owner),
                initial_balance,
                active,
                parent: None,
            })
        }
        AccountKind::SubAccount => {
            let row: Option<(i64, bool, i64)> = sqlx::query_as(
                r#"
                SELECT p.owner_user_id, s.active, p.id
                FROM sub_accounts s
                JOIN principal_accounts p ON p.id = s.principal_account_id
                WHERE s.id = $1
                FOR UPDATE OF s, p
                "#,
            )
            .bind(account.id)
            .fetch_optional(&mut *conn)
            .await?;
            let (owner, active, parent) =
                row.ok_or_else(|| DatabaseError::not_found("Sub-account", account.id))?;
            Ok(AccountMeta {
                owner: UserId::new(owner),
                initial_balance: Decimal::ZERO,
                active,
                parent: Some(PrincipalAccountId::new(parent)),
            })
        }
    }
}

const SELECT_COLUMNS: &str = "id, principal_account_id, sub_account_id, transaction_type, \
     amount, description, reference, owner_user_id, transaction_at, balance_after, \
     transfer_reference, accounting_status, created_at";

fn account_predicate(account: AccountRef) -> &'static str {
    match account.kind {
        AccountKind::Principal => "principal_account_id = $1",
        AccountKind::SubAccount => "sub_account_id = $1",
    }
}

/// Full history of an account in canonical order
pub(crate) async fn fetch_history(
    conn: &mut PgConnection,
    account: AccountRef,
) -> Result<Vec<Transaction>, DatabaseError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM transactions WHERE {} ORDER BY transaction_at, id",
        account_predicate(account)
    );
    let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
        .bind(account.id)
        .fetch_all(&mut *conn)
        .await?;
    rows.into_iter().map(TransactionRow::into_domain).collect()
}

/// Recomputes `balance_after` from `from` onward and stores the results
///
/// Runs inside the caller's transactional unit; the account row must
/// already be locked.
pub(crate) async fn recompute_and_store(
    conn: &mut PgConnection,
    account: AccountRef,
    initial_balance: Decimal,
    from: DateTime<Utc>,
) -> Result<Decimal, DatabaseError> {
    let mut rows = fetch_history(&mut *conn, account).await?;
    let before: Vec<Option<Decimal>> = rows.iter().map(|row| row.balance_after).collect();
    let current = recompute_from(initial_balance, &mut rows, from);

    for (row, old) in rows.iter().zip(before) {
        if row.balance_after != old {
            sqlx::query("UPDATE transactions SET balance_after = $2 WHERE id = $1")
                .bind(row.id.as_i64())
                .bind(row.balance_after)
                .execute(&mut *conn)
                .await?;
        }
    }

    let table = match account.kind {
        AccountKind::Principal => "principal_accounts",
        AccountKind::SubAccount => "sub_accounts",
    };
    sqlx::query(&format!(
        "UPDATE {table} SET current_balance = $2 WHERE id = $1"
    ))
    .bind(account.id)
    .bind(current)
    .execute(&mut *conn)
    .await?;

    Ok(current)
}

/// Inserts a row without recomputing; returns the assigned id
pub(crate) async fn insert_row(
    conn: &mut PgConnection,
    new: &NewTransaction,
) -> Result<TransactionId, DatabaseError> {
    let (principal_id, sub_id) = match new.account.kind {
        AccountKind::Principal => (Some(new.account.id), None),
        AccountKind::SubAccount => (None, Some(new.account.id)),
    };
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO transactions (
            principal_account_id, sub_account_id, transaction_type, amount,
            description, reference, owner_user_id, transaction_at,
            transfer_reference, accounting_status
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'to_post')
        RETURNING id
        "#,
    )
    .bind(principal_id)
    .bind(sub_id)
    .bind(new.transaction_type.as_str())
    .bind(new.amount)
    .bind(&new.description)
    .bind(&new.reference)
    .bind(new.owner.as_i64())
    .bind(new.transaction_at)
    .bind(new.transfer_reference.as_ref().map(|r| r.as_str()))
    .fetch_one(&mut *conn)
    .await?;
    Ok(TransactionId::new(id))
}

/// Validations shared by insert paths; the account must be locked already
pub(crate) fn check_writable(
    account: AccountRef,
    meta: &AccountMeta,
    owner: UserId,
) -> Result<(), DatabaseError> {
    if !meta.active {
        return Err(LedgerError::validation(format!("Account {account} is inactive")).into());
    }
    if meta.owner != owner {
        return Err(
            LedgerError::permission_denied(format!("{owner} does not own {account}")).into(),
        );
    }
    Ok(())
}

/// Repository for ledger transactions
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a transaction and recomputes the account from its date
    ///
    /// With `validate_balance` set, a debit whose amount exceeds the running
    /// balance at the transaction date fails with `InsufficientFunds` and
    /// nothing is written.
    pub async fn insert(
        &self,
        new: NewTransaction,
        validate_balance: bool,
    ) -> Result<TransactionId, DatabaseError> {
        new.validate().map_err(DatabaseError::Ledger)?;
        let mut tx = self.pool.begin().await?;

        let meta = lock_account(&mut tx, new.account).await?;
        check_writable(new.account, &meta, new.owner)?;

        if validate_balance && new.transaction_type.is_debit() {
            let rows = fetch_history(&mut tx, new.account).await?;
            let available = running_balance_at(meta.initial_balance, &rows, new.transaction_at);
            if available < new.amount {
                return Err(LedgerError::InsufficientFunds {
                    account: new.account,
                    requested: new.amount,
                    available,
                }
                .into());
            }
        }

        let id = insert_row(&mut tx, &new).await?;
        recompute_and_store(&mut tx, new.account, meta.initial_balance, new.transaction_at)
            .await?;
        tx.commit().await?;

        debug!(account = %new.account, %id, "inserted transaction");
        Ok(id)
    }

    /// Looks up a transaction by id
    pub async fn get(&self, id: TransactionId) -> Result<Transaction, DatabaseError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM transactions WHERE id = $1");
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| DatabaseError::not_found("Transaction", id))?
            .into_domain()
    }

    /// Full history of an account in canonical order
    pub async fn list_for_account(
        &self,
        account: AccountRef,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        fetch_history(&mut conn, account).await
    }

    /// A display page of an account's history, newest first
    pub async fn list_page(
        &self,
        account: AccountRef,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE {} \
             ORDER BY transaction_at DESC, id DESC LIMIT $2 OFFSET $3",
            account_predicate(account)
        );
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(account.id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    /// Latest transaction on the account with datetime <= `at`
    pub async fn previous_before(
        &self,
        account: AccountRef,
        at: DateTime<Utc>,
    ) -> Result<Option<Transaction>, DatabaseError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE {} AND transaction_at <= $2 \
             ORDER BY transaction_at DESC, id DESC LIMIT 1",
            account_predicate(account)
        );
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(account.id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TransactionRow::into_domain).transpose()
    }

    async fn sibling_of(
        &self,
        conn: &mut PgConnection,
        reference: &TransferReference,
        id: TransactionId,
    ) -> Result<Transaction, DatabaseError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM transactions WHERE transfer_reference = $1 AND id <> $2"
        );
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(reference.as_str())
            .bind(id.as_i64())
            .fetch_all(&mut *conn)
            .await?;
        match rows.len() {
            1 => rows.into_iter().next().expect("length checked").into_domain(),
            0 => Err(LedgerError::ConflictingTransfer(format!(
                "Sibling missing for transfer reference {reference}"
            ))
            .into()),
            _ => Err(LedgerError::ConflictingTransfer(format!(
                "More than two rows share transfer reference {reference}"
            ))
            .into()),
        }
    }

    /// Modifies a transaction; a transfer sibling receives the same changes
    /// and both accounts are recomputed
    pub async fn update(
        &self,
        caller: UserId,
        id: TransactionId,
        update: TransactionUpdate,
    ) -> Result<(), DatabaseError> {
        update.validate().map_err(DatabaseError::Ledger)?;
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {SELECT_COLUMNS} FROM transactions WHERE id = $1 FOR UPDATE");
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(id.as_i64())
            .fetch_optional(&mut *tx)
            .await?;
        let row = row
            .ok_or_else(|| DatabaseError::not_found("Transaction", id))?
            .into_domain()?;
        if row.owner != caller {
            return Err(LedgerError::permission_denied(format!(
                "{caller} does not own transaction {id}"
            ))
            .into());
        }

        let mut targets = vec![row.clone()];
        if row.is_transfer_sibling() {
            let reference = row.transfer_reference.clone().expect("sibling has reference");
            targets.push(self.sibling_of(&mut tx, &reference, id).await?);
        }

        // Lock in global order before writing anything
        let mut lock_refs: Vec<AccountRef> = targets.iter().map(|t| t.account).collect();
        lock_refs.sort();
        let mut metas = Vec::with_capacity(lock_refs.len());
        for account in &lock_refs {
            metas.push((*account, lock_account(&mut tx, *account).await?));
        }

        for target in &targets {
            sqlx::query(
                r#"
                UPDATE transactions SET
                    amount = COALESCE($2, amount),
                    transaction_at = COALESCE($3, transaction_at),
                    description = COALESCE($4, description),
                    reference = COALESCE($5, reference)
                WHERE id = $1
                "#,
            )
            .bind(target.id.as_i64())
            .bind(update.new_amount)
            .bind(update.new_datetime)
            .bind(update.new_description.as_deref())
            .bind(update.new_reference.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        if update.affects_balance() {
            for target in &targets {
                let from = match update.new_datetime {
                    Some(new_at) => new_at.min(target.transaction_at),
                    None => target.transaction_at,
                };
                let meta = metas
                    .iter()
                    .find(|(account, _)| *account == target.account)
                    .map(|(_, meta)| *meta)
                    .expect("account locked above");
                recompute_and_store(&mut tx, target.account, meta.initial_balance, from).await?;
            }
        }

        tx.commit().await?;
        debug!(%id, "updated transaction");
        Ok(())
    }

    /// Deletes a transaction; both siblings of a transfer are removed and
    /// each affected account recomputed from the earliest sibling date
    ///
    /// For transfers, ownership is checked on the outgoing (debit) side.
    pub async fn delete(&self, caller: UserId, id: TransactionId) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {SELECT_COLUMNS} FROM transactions WHERE id = $1 FOR UPDATE");
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(id.as_i64())
            .fetch_optional(&mut *tx)
            .await?;
        let row = row
            .ok_or_else(|| DatabaseError::not_found("Transaction", id))?
            .into_domain()?;

        let mut doomed = vec![row.clone()];
        if row.is_transfer_sibling() {
            let reference = row.transfer_reference.clone().expect("sibling has reference");
            doomed.push(self.sibling_of(&mut tx, &reference, id).await?);
        }

        let outgoing = doomed
            .iter()
            .find(|t| t.transaction_type.is_debit())
            .unwrap_or(&row);
        if outgoing.owner != caller {
            return Err(LedgerError::permission_denied(format!(
                "{caller} does not own the outgoing side of transaction {id}"
            ))
            .into());
        }

        let mut lock_refs: Vec<AccountRef> = doomed.iter().map(|t| t.account).collect();
        lock_refs.sort();
        let mut metas = Vec::with_capacity(lock_refs.len());
        for account in &lock_refs {
            metas.push((*account, lock_account(&mut tx, *account).await?));
        }

        let earliest = doomed
            .iter()
            .map(|t| t.transaction_at)
            .min()
            .expect("at least one row");
        for target in &doomed {
            sqlx::query("DELETE FROM transactions WHERE id = $1")
                .bind(target.id.as_i64())
                .execute(&mut *tx)
                .await?;
        }
        for (account, meta) in &metas {
            recompute_and_store(&mut tx, *account, meta.initial_balance, earliest).await?;
        }

        tx.commit().await?;
        debug!(%id, "deleted transaction");
        Ok(())
    }

    /// Manual accounting-status override: `ignored` or `to_post` only
    pub async fn set_accounting_status(
        &self,
        caller: UserId,
        id: TransactionId,
        status: AccountingStatus,
    ) -> Result<(), DatabaseError> {
        if status == AccountingStatus::Posted {
            return Err(LedgerError::validation(
                "Status 'posted' can only be set by linking entries".to_string(),
            )
            .into());
        }
        let row = self.get(id).await?;
        if row.owner != caller {
            return Err(LedgerError::permission_denied(format!(
                "{caller} does not own transaction {id}"
            ))
            .into());
        }
        sqlx::query("UPDATE transactions SET accounting_status = $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Repair walk: recomputes the entire history from the initial balance
    pub async fn recompute_all(&self, account: AccountRef) -> Result<Decimal, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let meta = lock_account(&mut tx, account).await?;

        // Clear the caches so the walk reseeds from the initial balance
        let sql = format!(
            "UPDATE transactions SET balance_after = NULL WHERE {}",
            account_predicate(account)
        );
        sqlx::query(&sql).bind(account.id).execute(&mut *tx).await?;

        let mut rows = fetch_history(&mut tx, account).await?;
        let current = domain_ledger::recompute_all(meta.initial_balance, &mut rows);
        for row in &rows {
            sqlx::query("UPDATE transactions SET balance_after = $2 WHERE id = $1")
                .bind(row.id.as_i64())
                .bind(row.balance_after)
                .execute(&mut *tx)
                .await?;
        }
        let table = match account.kind {
            AccountKind::Principal => "principal_accounts",
            AccountKind::SubAccount => "sub_accounts",
        };
        sqlx::query(&format!(
            "UPDATE {table} SET current_balance = $2 WHERE id = $1"
        ))
        .bind(account.id)
        .bind(current)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(current)
    }
}
