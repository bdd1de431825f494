//! Period query repository
//!
//! Read-only reporting over an account's history. The aggregations are the
//! pure domain functions; this module fetches the rows and resolves transfer
//! counterparties with a single self-join.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;

use core_kernel::{DateRange, TransactionId};
use domain_ledger::{
    balance_history, daily_balance_series, period_statistics, top_counterparties, AccountKind,
    AccountRef, CounterpartySummary, Direction, PeriodStatistics, Transaction,
};

use crate::error::DatabaseError;
use crate::repositories::accounts::AccountRepository;
use crate::repositories::transactions::TransactionRepository;

/// Repository for period-scoped reporting queries
#[derive(Debug, Clone)]
pub struct PeriodQueryRepository {
    pool: PgPool,
    accounts: AccountRepository,
    transactions: TransactionRepository,
}

impl PeriodQueryRepository {
    pub fn new(pool: PgPool) -> Self {
        let accounts = AccountRepository::new(pool.clone());
        let transactions = TransactionRepository::new(pool.clone());
        Self {
            pool,
            accounts,
            transactions,
        }
    }

    async fn initial_balance(&self, account: AccountRef) -> Result<Decimal, DatabaseError> {
        match account.kind {
            AccountKind::Principal => {
                let principal = self
                    .accounts
                    .get_principal(core_kernel::PrincipalAccountId::new(account.id))
                    .await?;
                Ok(principal.initial_balance)
            }
            AccountKind::SubAccount => Ok(Decimal::ZERO),
        }
    }

    /// Transactions within the range, newest first
    pub async fn balance_history(
        &self,
        account: AccountRef,
        range: &DateRange,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let rows = self.transactions.list_for_account(account).await?;
        Ok(balance_history(&rows, range)
            .into_iter()
            .cloned()
            .collect())
    }

    /// End-of-day balance for each calendar day in the range
    pub async fn daily_balance_series(
        &self,
        account: AccountRef,
        range: &DateRange,
    ) -> Result<Vec<(NaiveDate, Decimal)>, DatabaseError> {
        let initial = self.initial_balance(account).await?;
        let rows = self.transactions.list_for_account(account).await?;
        Ok(daily_balance_series(initial, &rows, range))
    }

    /// Credit and debit totals plus the transaction count within the range
    pub async fn period_statistics(
        &self,
        account: AccountRef,
        range: &DateRange,
    ) -> Result<PeriodStatistics, DatabaseError> {
        let rows = self.transactions.list_for_account(account).await?;
        Ok(period_statistics(&rows, range))
    }

    /// Sibling accounts of the account's transfer rows, keyed by row id
    async fn counterparty_map(
        &self,
        account: AccountRef,
    ) -> Result<HashMap<TransactionId, AccountRef>, DatabaseError> {
        let predicate = match account.kind {
            AccountKind::Principal => "a.principal_account_id = $1",
            AccountKind::SubAccount => "a.sub_account_id = $1",
        };
        let sql = format!(
            "SELECT a.id, b.principal_account_id, b.sub_account_id \
             FROM transactions a \
             JOIN transactions b \
               ON b.transfer_reference = a.transfer_reference AND b.id <> a.id \
             WHERE {predicate} AND a.transfer_reference IS NOT NULL"
        );
        let rows: Vec<(i64, Option<i64>, Option<i64>)> = sqlx::query_as(&sql)
            .bind(account.id)
            .fetch_all(&self.pool)
            .await?;

        let mut map = HashMap::with_capacity(rows.len());
        for (id, principal_id, sub_id) in rows {
            let other = match (principal_id, sub_id) {
                (Some(principal), None) => AccountRef {
                    kind: AccountKind::Principal,
                    id: principal,
                },
                (None, Some(sub)) => AccountRef {
                    kind: AccountKind::SubAccount,
                    id: sub,
                },
                _ => {
                    return Err(DatabaseError::ConstraintViolation(format!(
                        "Transfer sibling of transaction {id} must reference exactly one account"
                    )))
                }
            };
            map.insert(TransactionId::new(id), other);
        }
        Ok(map)
    }

    /// Transfer volume per counterparty account within the range, sorted by
    /// total descending
    pub async fn top_counterparties(
        &self,
        account: AccountRef,
        range: &DateRange,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<CounterpartySummary>, DatabaseError> {
        let rows = self.transactions.list_for_account(account).await?;
        let siblings = self.counterparty_map(account).await?;
        Ok(top_counterparties(&rows, range, direction, limit, |row| {
            siblings.get(&row.id).copied()
        }))
    }
}
