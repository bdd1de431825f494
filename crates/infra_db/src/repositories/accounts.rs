//! Account repository
//!
//! CRUD for principal accounts and their sub-account buckets. Accounts are
//! soft-deactivated; history is never dropped.

use chrono::NaiveDate;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::debug;

use core_kernel::{BankId, Currency, PrincipalAccountId, SubAccountId, UserId};
use domain_ledger::{
    AccountKind, AccountRef, LedgerError, PrincipalAccount, PrincipalAccountType, SubAccount,
    TransferEndpoint,
};

use crate::error::DatabaseError;

#[derive(Debug, sqlx::FromRow)]
struct PrincipalAccountRow {
    id: i64,
    owner_user_id: i64,
    bank_id: i64,
    display_name: String,
    account_number: Option<String>,
    iban: Option<String>,
    bic: Option<String>,
    account_type: String,
    current_balance: Decimal,
    initial_balance: Decimal,
    currency: String,
    opened_on: Option<NaiveDate>,
    active: bool,
    created_at: DateTime<Utc>,
}

impl PrincipalAccountRow {
    fn into_domain(self) -> Result<PrincipalAccount, DatabaseError> {
        Ok(PrincipalAccount {
            id: PrincipalAccountId::new(self.id),
            owner: UserId::new(self.owner_user_id),
            bank_id: BankId::new(self.bank_id),
            display_name: self.display_name,
            account_number: self.account_number,
            iban: self.iban,
            bic: self.bic,
            account_type: self
                .account_type
                .parse::<PrincipalAccountType>()
                .map_err(DatabaseError::Ledger)?,
            current_balance: self.current_balance,
            initial_balance: self.initial_balance,
            currency: self
                .currency
                .parse::<Currency>()
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            opened_on: self.opened_on,
            active: self.active,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubAccountRow {
    id: i64,
    principal_account_id: i64,
    display_name: String,
    description: Option<String>,
    goal_amount: Option<Decimal>,
    goal_date: Option<NaiveDate>,
    current_balance: Decimal,
    color: Option<String>,
    icon: Option<String>,
    active: bool,
}

impl SubAccountRow {
    fn into_domain(self) -> SubAccount {
        SubAccount {
            id: SubAccountId::new(self.id),
            parent_id: PrincipalAccountId::new(self.principal_account_id),
            display_name: self.display_name,
            description: self.description,
            goal_amount: self.goal_amount,
            goal_date: self.goal_date,
            current_balance: self.current_balance,
            color: self.color,
            icon: self.icon,
            active: self.active,
        }
    }
}

const PRINCIPAL_COLUMNS: &str = "id, owner_user_id, bank_id, display_name, account_number, \
     iban, bic, account_type, current_balance, initial_balance, currency, opened_on, active, \
     created_at";

const SUB_COLUMNS: &str = "id, principal_account_id, display_name, description, goal_amount, \
     goal_date, current_balance, color, icon, active";

/// Repository for principal accounts and sub-accounts
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a principal account; the cached balance starts at the initial
    /// balance
    pub async fn create_principal(
        &self,
        owner: UserId,
        bank_id: BankId,
        display_name: &str,
        account_type: PrincipalAccountType,
        initial_balance: Decimal,
        currency: Currency,
    ) -> Result<PrincipalAccount, DatabaseError> {
        let sql = format!(
            r#"
            INSERT INTO principal_accounts (
                owner_user_id, bank_id, display_name, account_type,
                current_balance, initial_balance, currency
            ) VALUES ($1, $2, $3, $4, $5, $5, $6)
            RETURNING {PRINCIPAL_COLUMNS}
            "#
        );
        let row: PrincipalAccountRow = sqlx::query_as(&sql)
            .bind(owner.as_i64())
            .bind(bank_id.as_i64())
            .bind(display_name)
            .bind(account_type.as_str())
            .bind(initial_balance)
            .bind(currency.code())
            .fetch_one(&self.pool)
            .await?;
        debug!(id = row.id, "created principal account");
        row.into_domain()
    }

    /// Opens a sub-account under an existing principal
    pub async fn create_sub_account(
        &self,
        caller: UserId,
        parent: PrincipalAccountId,
        display_name: &str,
    ) -> Result<SubAccount, DatabaseError> {
        let principal = self.get_principal(parent).await?;
        if principal.owner != caller {
            return Err(LedgerError::permission_denied(format!(
                "{caller} does not own principal account {parent}"
            ))
            .into());
        }
        let sql = format!(
            r#"
            INSERT INTO sub_accounts (principal_account_id, display_name, current_balance)
            VALUES ($1, $2, 0)
            RETURNING {SUB_COLUMNS}
            "#
        );
        let row: SubAccountRow = sqlx::query_as(&sql)
            .bind(parent.as_i64())
            .bind(display_name)
            .fetch_one(&self.pool)
            .await?;
        debug!(id = row.id, "created sub-account");
        Ok(row.into_domain())
    }

    pub async fn get_principal(
        &self,
        id: PrincipalAccountId,
    ) -> Result<PrincipalAccount, DatabaseError> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principal_accounts WHERE id = $1");
        let row: Option<PrincipalAccountRow> = sqlx::query_as(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| DatabaseError::not_found("Principal account", id))?
            .into_domain()
    }

    pub async fn get_sub_account(&self, id: SubAccountId) -> Result<SubAccount, DatabaseError> {
        let sql = format!("SELECT {SUB_COLUMNS} FROM sub_accounts WHERE id = $1");
        let row: Option<SubAccountRow> = sqlx::query_as(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .ok_or_else(|| DatabaseError::not_found("Sub-account", id))?
            .into_domain())
    }

    /// All principal accounts of a user, active first
    pub async fn list_user_principals(
        &self,
        owner: UserId,
    ) -> Result<Vec<PrincipalAccount>, DatabaseError> {
        let sql = format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principal_accounts \
             WHERE owner_user_id = $1 ORDER BY active DESC, display_name"
        );
        let rows: Vec<PrincipalAccountRow> = sqlx::query_as(&sql)
            .bind(owner.as_i64())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PrincipalAccountRow::into_domain).collect()
    }

    /// All sub-accounts under a principal
    pub async fn list_sub_accounts(
        &self,
        parent: PrincipalAccountId,
    ) -> Result<Vec<SubAccount>, DatabaseError> {
        let sql = format!(
            "SELECT {SUB_COLUMNS} FROM sub_accounts \
             WHERE principal_account_id = $1 ORDER BY display_name"
        );
        let rows: Vec<SubAccountRow> = sqlx::query_as(&sql)
            .bind(parent.as_i64())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(SubAccountRow::into_domain).collect())
    }

    /// The transfer endpoint view of an account (owner + parent)
    pub async fn endpoint(&self, account: AccountRef) -> Result<TransferEndpoint, DatabaseError> {
        match account.kind {
            AccountKind::Principal => {
                let principal = self.get_principal(PrincipalAccountId::new(account.id)).await?;
                Ok(TransferEndpoint::principal(principal.id, principal.owner))
            }
            AccountKind::SubAccount => {
                let sub = self.get_sub_account(SubAccountId::new(account.id)).await?;
                let parent = self.get_principal(sub.parent_id).await?;
                Ok(TransferEndpoint::sub_account(sub.id, parent.id, parent.owner))
            }
        }
    }

    /// Soft-deactivates an account; new writes are refused, history kept
    pub async fn deactivate(
        &self,
        caller: UserId,
        account: AccountRef,
    ) -> Result<(), DatabaseError> {
        let endpoint = self.endpoint(account).await?;
        if endpoint.owner != caller {
            return Err(LedgerError::permission_denied(format!(
                "{caller} does not own {account}"
            ))
            .into());
        }
        let table = match account.kind {
            AccountKind::Principal => "principal_accounts",
            AccountKind::SubAccount => "sub_accounts",
        };
        sqlx::query(&format!("UPDATE {table} SET active = FALSE WHERE id = $1"))
            .bind(account.id)
            .execute(&self.pool)
            .await?;
        debug!(%account, "deactivated account");
        Ok(())
    }
}
