//! Accounting categories and their complementary specifications
//!
//! A category may carry a complementary spec; creating a principal journal
//! entry in such a category spawns a second, auto-generated entry (the VAT
//! split being the typical case). The spec is static per category: editing it
//! never rewrites historical entries.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use core_kernel::{CategoryId, Rate, UserId};

use crate::entry::EntryType;
use crate::error::AccountingError;

/// Accounting nature of a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryType {
    Asset,
    Liability,
    Expense,
    Income,
}

impl CategoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryType::Asset => "asset",
            CategoryType::Liability => "liability",
            CategoryType::Expense => "expense",
            CategoryType::Income => "income",
        }
    }
}

impl std::str::FromStr for CategoryType {
    type Err = AccountingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asset" => Ok(CategoryType::Asset),
            "liability" => Ok(CategoryType::Liability),
            "expense" => Ok(CategoryType::Expense),
            "income" => Ok(CategoryType::Income),
            other => Err(AccountingError::validation(format!(
                "Unknown category type: {other}"
            ))),
        }
    }
}

/// Configuration spawning a complementary entry alongside a principal one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplementarySpec {
    /// Category the complementary entry is filed under
    pub target_category_id: CategoryId,
    /// Percentage of the principal's TTC amount
    pub rate: Rate,
    /// Type of the spawned entry
    pub entry_type: EntryType,
}

/// An accounting category owned by one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub owner: UserId,
    /// Short numeric code, e.g. "4400"
    pub number: String,
    pub name: String,
    pub category_type: CategoryType,
    /// Set iff entries in this category spawn a complementary
    pub complementary: Option<ComplementarySpec>,
}

impl Category {
    pub fn new(
        id: CategoryId,
        owner: UserId,
        number: impl Into<String>,
        name: impl Into<String>,
        category_type: CategoryType,
    ) -> Self {
        Self {
            id,
            owner,
            number: number.into(),
            name: name.into(),
            category_type,
            complementary: None,
        }
    }

    pub fn with_complementary(mut self, spec: ComplementarySpec) -> Self {
        self.complementary = Some(spec);
        self
    }

    pub fn is_complementary_bearing(&self) -> bool {
        self.complementary.is_some()
    }
}

/// In-memory category registry
///
/// Read-mostly: the journal store consults it on every create, users edit it
/// rarely.
#[derive(Debug, Default)]
pub struct CategoryRegistry {
    categories: HashMap<CategoryId, Category>,
    next_id: i64,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a category, assigning its id
    pub fn insert(
        &mut self,
        owner: UserId,
        number: impl Into<String>,
        name: impl Into<String>,
        category_type: CategoryType,
        complementary: Option<ComplementarySpec>,
    ) -> CategoryId {
        self.next_id += 1;
        let id = CategoryId::new(self.next_id);
        self.categories.insert(
            id,
            Category {
                id,
                owner,
                number: number.into(),
                name: name.into(),
                category_type,
                complementary,
            },
        );
        id
    }

    pub fn get(&self, id: CategoryId) -> Result<&Category, AccountingError> {
        self.categories
            .get(&id)
            .ok_or_else(|| AccountingError::not_found(format!("Category {id}")))
    }

    /// All categories of a user, sorted by number
    pub fn list_user_categories(&self, owner: UserId) -> Vec<&Category> {
        let mut list: Vec<&Category> = self
            .categories
            .values()
            .filter(|category| category.owner == owner)
            .collect();
        list.sort_by(|a, b| a.number.cmp(&b.number));
        list
    }

    /// Ids of the user's categories that trigger a complementary entry
    pub fn with_complementaries(&self, owner: UserId) -> HashSet<CategoryId> {
        self.categories
            .values()
            .filter(|category| category.owner == owner && category.is_complementary_bearing())
            .map(|category| category.id)
            .collect()
    }

    /// Replaces a category's complementary configuration
    ///
    /// Affects future entries only; historical entries keep the amounts they
    /// were created with.
    pub fn set_complementary(
        &mut self,
        id: CategoryId,
        spec: Option<ComplementarySpec>,
    ) -> Result<(), AccountingError> {
        let category = self
            .categories
            .get_mut(&id)
            .ok_or_else(|| AccountingError::not_found(format!("Category {id}")))?;
        category.complementary = spec;
        Ok(())
    }
}
