use serde::Serialize;
use time::OffsetDateTime;

use super::repo_types::Category;
use crate::products::dto::ProductView;

#[derive(Debug, Serialize)]
pub struct CategorySummary {
    pub id: i64,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub products_count: i64,
}

impl CategorySummary {
    pub fn new(category: Category, products_count: i64) -> Self {
        Self {
            id: category.id,
            name: category.name,
            created_at: category.created_at,
            updated_at: category.updated_at,
            products_count,
        }
    }
}

/// A category with its products embedded.
#[derive(Debug, Serialize)]
pub struct CategoryDetail {
    pub id: i64,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub products: Vec<ProductView>,
}
