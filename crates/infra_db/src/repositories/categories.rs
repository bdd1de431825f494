//! Category repository
//!
//! Read-mostly store for accounting categories and their complementary
//! specifications.

use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::HashSet;

use core_kernel::{CategoryId, Rate, UserId};
use domain_accounting::{AccountingError, Category, CategoryType, ComplementarySpec, EntryType};

use crate::error::DatabaseError;

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    owner_user_id: i64,
    number: String,
    name: String,
    category_type: String,
    complementary_category_id: Option<i64>,
    complementary_rate: Option<Decimal>,
    complementary_entry_type: Option<String>,
}

impl CategoryRow {
    fn into_domain(self) -> Result<Category, DatabaseError> {
        let complementary = match (
            self.complementary_category_id,
            self.complementary_rate,
            self.complementary_entry_type,
        ) {
            (Some(target), Some(rate), Some(entry_type)) => Some(ComplementarySpec {
                target_category_id: CategoryId::new(target),
                rate: Rate::from_percentage(rate),
                entry_type: entry_type
                    .parse::<EntryType>()
                    .map_err(DatabaseError::Accounting)?,
            }),
            (None, None, None) => None,
            _ => {
                return Err(DatabaseError::ConstraintViolation(format!(
                    "Category {} has a partial complementary spec",
                    self.id
                )))
            }
        };
        Ok(Category {
            id: CategoryId::new(self.id),
            owner: UserId::new(self.owner_user_id),
            number: self.number,
            name: self.name,
            category_type: self
                .category_type
                .parse::<CategoryType>()
                .map_err(DatabaseError::Accounting)?,
            complementary,
        })
    }
}

const CATEGORY_COLUMNS: &str = "id, owner_user_id, number, name, category_type, \
     complementary_category_id, complementary_rate, complementary_entry_type";

/// Repository for accounting categories
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: PgPool,
}

impl CategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        owner: UserId,
        number: &str,
        name: &str,
        category_type: CategoryType,
        complementary: Option<ComplementarySpec>,
    ) -> Result<Category, DatabaseError> {
        let sql = format!(
            r#"
            INSERT INTO categories_accounting (
                owner_user_id, number, name, category_type,
                complementary_category_id, complementary_rate, complementary_entry_type
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CATEGORY_COLUMNS}
            "#
        );
        let row: CategoryRow = sqlx::query_as(&sql)
            .bind(owner.as_i64())
            .bind(number)
            .bind(name)
            .bind(category_type.as_str())
            .bind(complementary.map(|spec| spec.target_category_id.as_i64()))
            .bind(complementary.map(|spec| spec.rate.as_percentage()))
            .bind(complementary.map(|spec| spec.entry_type.as_str()))
            .fetch_one(&self.pool)
            .await?;
        row.into_domain()
    }

    pub async fn get(&self, id: CategoryId) -> Result<Category, DatabaseError> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories_accounting WHERE id = $1");
        let row: Option<CategoryRow> = sqlx::query_as(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        row.ok_or_else(|| DatabaseError::not_found("Category", id))?
            .into_domain()
    }

    /// All categories of a user, sorted by number
    pub async fn list_user_categories(
        &self,
        owner: UserId,
    ) -> Result<Vec<Category>, DatabaseError> {
        let sql = format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories_accounting \
             WHERE owner_user_id = $1 ORDER BY number"
        );
        let rows: Vec<CategoryRow> = sqlx::query_as(&sql)
            .bind(owner.as_i64())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(CategoryRow::into_domain).collect()
    }

    /// Ids of the user's categories that trigger a complementary entry
    pub async fn get_with_complementaries(
        &self,
        owner: UserId,
    ) -> Result<HashSet<CategoryId>, DatabaseError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM categories_accounting \
             WHERE owner_user_id = $1 AND complementary_category_id IS NOT NULL",
        )
        .bind(owner.as_i64())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| CategoryId::new(id)).collect())
    }

    /// Replaces a category's complementary configuration; historical entries
    /// keep the amounts they were created with
    pub async fn set_complementary(
        &self,
        caller: UserId,
        id: CategoryId,
        spec: Option<ComplementarySpec>,
    ) -> Result<(), DatabaseError> {
        let category = self.get(id).await?;
        if category.owner != caller {
            return Err(AccountingError::permission_denied(format!(
                "{caller} does not own category {id}"
            ))
            .into());
        }
        sqlx::query(
            r#"
            UPDATE categories_accounting SET
                complementary_category_id = $2,
                complementary_rate = $3,
                complementary_entry_type = $4
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(spec.map(|s| s.target_category_id.as_i64()))
        .bind(spec.map(|s| s.rate.as_percentage()))
        .bind(spec.map(|s| s.entry_type.as_str()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
