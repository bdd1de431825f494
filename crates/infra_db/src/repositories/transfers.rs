//! Transfer repository
//!
//! Internal transfers write both sibling rows and recompute both accounts
//! inside one transactional unit. Account rows are always locked in global
//! (kind, id) order so concurrent transfers cannot deadlock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::debug;

use core_kernel::{Currency, ExternalTransferId, TransactionId, TransferReference, UserId};
use domain_ledger::{
    plan_external_reversal, plan_external_transfer, plan_internal_transfer, running_balance_at,
    AccountKind, AccountRef, ExternalTransfer, ExternalTransferRequest, ExternalTransferStatus,
    LedgerError, TransferEndpoint,
};

use crate::error::DatabaseError;
use crate::repositories::accounts::AccountRepository;
use crate::repositories::transactions::{
    check_writable, fetch_history, insert_row, lock_account, recompute_and_store,
};

#[derive(Debug, sqlx::FromRow)]
struct ExternalTransferRow {
    id: i64,
    owner_user_id: i64,
    principal_account_id: Option<i64>,
    sub_account_id: Option<i64>,
    transaction_id: i64,
    iban: String,
    bic: Option<String>,
    beneficiary_name: String,
    amount: Decimal,
    currency: String,
    description: String,
    status: String,
    requested_at: DateTime<Utc>,
}

impl ExternalTransferRow {
    fn into_domain(self) -> Result<ExternalTransfer, DatabaseError> {
        let source = match (self.principal_account_id, self.sub_account_id) {
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
                    "External transfer {} must reference exactly one account",
                    self.id
                )))
            }
        };
        Ok(ExternalTransfer {
            id: ExternalTransferId::new(self.id),
            owner: UserId::new(self.owner_user_id),
            source,
            transaction_id: TransactionId::new(self.transaction_id),
            iban: self.iban,
            bic: self.bic,
            beneficiary_name: self.beneficiary_name,
            amount: self.amount,
            currency: self
                .currency
                .parse::<Currency>()
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            description: self.description,
            status: self.status.parse().map_err(DatabaseError::Ledger)?,
            requested_at: self.requested_at,
        })
    }
}

const EXTERNAL_COLUMNS: &str = "id, owner_user_id, principal_account_id, sub_account_id, \
     transaction_id, iban, bic, beneficiary_name, amount, currency, description, status, \
     requested_at";

/// Repository for internal and external transfers
#[derive(Debug, Clone)]
pub struct TransferRepository {
    pool: PgPool,
    accounts: AccountRepository,
}

impl TransferRepository {
    pub fn new(pool: PgPool) -> Self {
        let accounts = AccountRepository::new(pool.clone());
        Self { pool, accounts }
    }

    /// Creates an internal transfer: two sibling rows under one fresh
    /// reference, both accounts recomputed, all in one unit
    pub async fn internal_transfer(
        &self,
        caller: UserId,
        source: AccountRef,
        dest: AccountRef,
        amount: Decimal,
        at: DateTime<Utc>,
        description: &str,
    ) -> Result<TransferReference, DatabaseError> {
        let source_endpoint = self.accounts.endpoint(source).await?;
        let dest_endpoint = self.accounts.endpoint(dest).await?;
        if source_endpoint.owner != caller {
            return Err(LedgerError::permission_denied(format!(
                "{caller} does not own {source}"
            ))
            .into());
        }
        let plan =
            plan_internal_transfer(&source_endpoint, &dest_endpoint, amount, at, description)
                .map_err(DatabaseError::Ledger)?;

        let mut tx = self.pool.begin().await?;

        let mut metas = std::collections::HashMap::new();
        for account in plan.lock_order() {
            metas.insert(account, lock_account(&mut tx, account).await?);
        }
        let source_meta = metas[&source];
        let dest_meta = metas[&dest];
        check_writable(source, &source_meta, caller)?;
        if !dest_meta.active {
            return Err(LedgerError::validation(format!(
                "Account {dest} is inactive"
            ))
            .into());
        }

        let rows = fetch_history(&mut tx, source).await?;
        let available = running_balance_at(source_meta.initial_balance, &rows, at);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                account: source,
                requested: amount,
                available,
            }
            .into());
        }

        insert_row(&mut tx, &plan.outgoing).await?;
        insert_row(&mut tx, &plan.incoming).await?;
        recompute_and_store(&mut tx, source, source_meta.initial_balance, at).await?;
        recompute_and_store(&mut tx, dest, dest_meta.initial_balance, at).await?;
        tx.commit().await?;

        debug!(%source, %dest, reference = %plan.reference, "created internal transfer");
        Ok(plan.reference)
    }

    fn endpoint_from_meta(
        account: AccountRef,
        meta: &crate::repositories::transactions::AccountMeta,
    ) -> TransferEndpoint {
        TransferEndpoint {
            account,
            owner: meta.owner,
            parent: meta.parent,
        }
    }

    /// Creates an external transfer: a debit on the source plus a pending
    /// registry record, in one unit
    pub async fn external_transfer(
        &self,
        caller: UserId,
        source: AccountRef,
        request: ExternalTransferRequest,
    ) -> Result<ExternalTransferId, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let meta = lock_account(&mut tx, source).await?;
        check_writable(source, &meta, caller)?;
        let endpoint = Self::endpoint_from_meta(source, &meta);
        let debit = plan_external_transfer(&endpoint, &request).map_err(DatabaseError::Ledger)?;

        let rows = fetch_history(&mut tx, source).await?;
        let available = running_balance_at(meta.initial_balance, &rows, request.at);
        if available < request.amount {
            return Err(LedgerError::InsufficientFunds {
                account: source,
                requested: request.amount,
                available,
            }
            .into());
        }

        let transaction_id = insert_row(&mut tx, &debit).await?;
        recompute_and_store(&mut tx, source, meta.initial_balance, request.at).await?;

        let (principal_id, sub_id) = match source.kind {
            AccountKind::Principal => (Some(source.id), None),
            AccountKind::SubAccount => (None, Some(source.id)),
        };
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO transfers_external (
                owner_user_id, principal_account_id, sub_account_id, transaction_id,
                iban, bic, beneficiary_name, amount, currency, description,
                status, requested_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', $11)
            RETURNING id
            "#,
        )
        .bind(caller.as_i64())
        .bind(principal_id)
        .bind(sub_id)
        .bind(transaction_id.as_i64())
        .bind(&request.iban)
        .bind(&request.bic)
        .bind(&request.beneficiary_name)
        .bind(request.amount)
        .bind(request.currency.code())
        .bind(&request.description)
        .bind(request.at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(%source, id, "created external transfer");
        Ok(ExternalTransferId::new(id))
    }

    /// Looks up an external transfer record
    pub async fn get_external(
        &self,
        id: ExternalTransferId,
    ) -> Result<ExternalTransfer, DatabaseError> {
        let sql = format!("SELECT {EXTERNAL_COLUMNS} FROM transfers_external WHERE id = $1");
        let row: Option<ExternalTransferRow> = sqlx::query_as(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| DatabaseError::not_found("External transfer", id))?
            .into_domain()
    }

    /// Pending external transfers of a user, oldest first
    pub async fn list_pending(
        &self,
        owner: UserId,
    ) -> Result<Vec<ExternalTransfer>, DatabaseError> {
        let sql = format!(
            "SELECT {EXTERNAL_COLUMNS} FROM transfers_external \
             WHERE owner_user_id = $1 AND status = 'pending' ORDER BY requested_at"
        );
        let rows: Vec<ExternalTransferRow> = sqlx::query_as(&sql)
            .bind(owner.as_i64())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ExternalTransferRow::into_domain).collect()
    }

    /// Cancels a pending external transfer with a reversal credit
    pub async fn cancel_external_transfer(
        &self,
        caller: UserId,
        id: ExternalTransferId,
    ) -> Result<TransactionId, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let sql =
            format!("SELECT {EXTERNAL_COLUMNS} FROM transfers_external WHERE id = $1 FOR UPDATE");
        let row: Option<ExternalTransferRow> = sqlx::query_as(&sql)
            .bind(id.as_i64())
            .fetch_optional(&mut *tx)
            .await?;
        let transfer = row
            .ok_or_else(|| DatabaseError::not_found("External transfer", id))?
            .into_domain()?;
        if transfer.owner != caller {
            return Err(LedgerError::permission_denied(format!(
                "{caller} does not own external transfer {id}"
            ))
            .into());
        }

        let now = Utc::now();
        let reversal = plan_external_reversal(&transfer, now).map_err(DatabaseError::Ledger)?;

        let meta = lock_account(&mut tx, transfer.source).await?;
        let reversal_id = insert_row(&mut tx, &reversal).await?;
        recompute_and_store(&mut tx, transfer.source, meta.initial_balance, now).await?;

        sqlx::query("UPDATE transfers_external SET status = $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(ExternalTransferStatus::Cancelled.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(%id, "cancelled external transfer");
        Ok(reversal_id)
    }
}
