use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::Product;
use crate::cache;
use crate::pagination::PageMeta;

/// Raw listing query. Values stay strings so that garbage input falls back to
/// defaults instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub category_id: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub featured: Option<String>,
    pub published: Option<String>,
    pub in_stock: Option<String>,
}

/// Denormalized product read view (product + category name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductView {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: String,
    pub stock_quantity: i32,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    pub is_featured: bool,
    pub is_admin: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ProductView {
    pub fn new(product: Product, category_name: Option<String>) -> Self {
        let mut price = product.price;
        price.rescale(2);
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            price: price.to_string(),
            stock_quantity: product.stock_quantity,
            category_id: product.category_id,
            category_name,
            published_at: product.published_at,
            is_featured: product.is_featured,
            is_admin: product.is_admin,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }

    /// Freshness token over every field of the view.
    pub fn etag(&self) -> String {
        let opt = |v: Option<String>| v.unwrap_or_else(|| "\u{0}".into());
        let parts = [
            self.id.to_string(),
            self.name.clone(),
            opt(self.description.clone()),
            self.price.clone(),
            self.stock_quantity.to_string(),
            opt(self.category_id.map(|id| id.to_string())),
            opt(self.category_name.clone()),
            opt(self.published_at.map(|t| t.unix_timestamp_nanos().to_string())),
            self.is_featured.to_string(),
            self.is_admin.to_string(),
            self.updated_at.unix_timestamp_nanos().to_string(),
        ];
        cache::etag(parts.iter().map(String::as_str))
    }
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<ProductView>,
    pub pagination: PageMeta,
}

#[derive(Debug, Serialize)]
pub struct FeaturedProduct {
    pub id: i64,
    pub name: String,
    pub is_featured: bool,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub featured_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub struct FeatureResponse {
    pub message: &'static str,
    pub product: FeaturedProduct,
}
