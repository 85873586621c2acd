use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::categories::repo_types::{Category, CategoryFields};
use crate::products::repo_types::{Product, ProductFields, ProductFilter};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence seam for categories and products. Every method is one store
/// round trip; callers rely on that to bound the number of queries per request.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn find_category(&self, id: i64) -> StoreResult<Option<Category>>;
    async fn find_category_by_name(&self, name: &str) -> StoreResult<Option<Category>>;
    /// Batched lookup; ids that do not resolve are simply absent from the result.
    async fn categories_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Category>>;
    async fn insert_category(&self, fields: &CategoryFields) -> StoreResult<Category>;
    async fn update_category(&self, id: i64, fields: &CategoryFields) -> StoreResult<Option<Category>>;
    async fn delete_category(&self, id: i64) -> StoreResult<bool>;
    /// Product count per category id, for every category that has products.
    async fn product_counts_by_category(&self) -> StoreResult<HashMap<i64, i64>>;

    async fn count_products(&self, filter: &ProductFilter) -> StoreResult<i64>;
    async fn list_products(
        &self,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Product>>;
    async fn products_in_category(&self, category_id: i64) -> StoreResult<Vec<Product>>;
    async fn find_product(&self, id: i64) -> StoreResult<Option<Product>>;
    async fn insert_product(&self, fields: &ProductFields) -> StoreResult<Product>;
    async fn update_product(&self, id: i64, fields: &ProductFields) -> StoreResult<Option<Product>>;
    async fn set_featured(&self, id: i64, featured: bool) -> StoreResult<Option<Product>>;
    async fn delete_product(&self, id: i64) -> StoreResult<bool>;
}

#[derive(Default)]
struct Tables {
    categories: BTreeMap<i64, Category>,
    products: BTreeMap<i64, Product>,
    next_category_id: i64,
    next_product_id: i64,
}

/// In-process store with the same integrity rules as the relational schema
/// (unique category names, no deleting referenced categories). Counts calls.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    queries: AtomicUsize,
    category_queries: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total store operations served so far.
    #[cfg(test)]
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Operations that read the categories table.
    #[cfg(test)]
    pub fn category_query_count(&self) -> usize {
        self.category_queries.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.queries.fetch_add(1, Ordering::SeqCst);
    }

    fn record_category_read(&self) {
        self.record();
        self.category_queries.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        self.record_category_read();
        let t = self.tables.read().await;
        Ok(t.categories.values().cloned().collect())
    }

    async fn find_category(&self, id: i64) -> StoreResult<Option<Category>> {
        self.record_category_read();
        let t = self.tables.read().await;
        Ok(t.categories.get(&id).cloned())
    }

    async fn find_category_by_name(&self, name: &str) -> StoreResult<Option<Category>> {
        self.record_category_read();
        let t = self.tables.read().await;
        Ok(t.categories.values().find(|c| c.name == name).cloned())
    }

    async fn categories_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Category>> {
        self.record_category_read();
        let t = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| t.categories.get(id).cloned()).collect())
    }

    async fn insert_category(&self, fields: &CategoryFields) -> StoreResult<Category> {
        self.record();
        let mut t = self.tables.write().await;
        if t.categories.values().any(|c| c.name == fields.name) {
            return Err(StoreError::UniqueViolation("categories_name_key".into()));
        }
        t.next_category_id += 1;
        let now = OffsetDateTime::now_utc();
        let category = Category {
            id: t.next_category_id,
            name: fields.name.clone(),
            created_at: now,
            updated_at: now,
        };
        t.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, id: i64, fields: &CategoryFields) -> StoreResult<Option<Category>> {
        self.record();
        let mut t = self.tables.write().await;
        if t.categories.values().any(|c| c.id != id && c.name == fields.name) {
            return Err(StoreError::UniqueViolation("categories_name_key".into()));
        }
        let Some(category) = t.categories.get_mut(&id) else {
            return Ok(None);
        };
        category.name = fields.name.clone();
        category.updated_at = OffsetDateTime::now_utc();
        Ok(Some(category.clone()))
    }

    async fn delete_category(&self, id: i64) -> StoreResult<bool> {
        self.record();
        let mut t = self.tables.write().await;
        if t.products.values().any(|p| p.category_id == Some(id)) {
            return Err(StoreError::ForeignKeyViolation("products_category_id_fkey".into()));
        }
        Ok(t.categories.remove(&id).is_some())
    }

    async fn product_counts_by_category(&self) -> StoreResult<HashMap<i64, i64>> {
        self.record();
        let t = self.tables.read().await;
        let mut counts = HashMap::new();
        for category_id in t.products.values().filter_map(|p| p.category_id) {
            *counts.entry(category_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn count_products(&self, filter: &ProductFilter) -> StoreResult<i64> {
        self.record();
        let t = self.tables.read().await;
        Ok(t.products.values().filter(|p| filter.matches(p)).count() as i64)
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Product>> {
        self.record();
        let t = self.tables.read().await;
        Ok(t.products
            .values()
            .filter(|p| filter.matches(p))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn products_in_category(&self, category_id: i64) -> StoreResult<Vec<Product>> {
        self.record();
        let t = self.tables.read().await;
        Ok(t.products
            .values()
            .filter(|p| p.category_id == Some(category_id))
            .cloned()
            .collect())
    }

    async fn find_product(&self, id: i64) -> StoreResult<Option<Product>> {
        self.record();
        let t = self.tables.read().await;
        Ok(t.products.get(&id).cloned())
    }

    async fn insert_product(&self, fields: &ProductFields) -> StoreResult<Product> {
        self.record();
        let mut t = self.tables.write().await;
        t.next_product_id += 1;
        let now = OffsetDateTime::now_utc();
        let product = Product {
            id: t.next_product_id,
            name: fields.name.clone(),
            description: fields.description.clone(),
            price: fields.price,
            stock_quantity: fields.stock_quantity,
            category_id: fields.category_id,
            published_at: fields.published_at,
            is_featured: fields.is_featured,
            is_admin: false,
            created_at: now,
            updated_at: now,
        };
        t.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: i64, fields: &ProductFields) -> StoreResult<Option<Product>> {
        self.record();
        let mut t = self.tables.write().await;
        let Some(product) = t.products.get_mut(&id) else {
            return Ok(None);
        };
        product.name = fields.name.clone();
        product.description = fields.description.clone();
        product.price = fields.price;
        product.stock_quantity = fields.stock_quantity;
        product.category_id = fields.category_id;
        product.published_at = fields.published_at;
        product.is_featured = fields.is_featured;
        product.updated_at = OffsetDateTime::now_utc();
        Ok(Some(product.clone()))
    }

    async fn set_featured(&self, id: i64, featured: bool) -> StoreResult<Option<Product>> {
        self.record();
        let mut t = self.tables.write().await;
        let Some(product) = t.products.get_mut(&id) else {
            return Ok(None);
        };
        product.is_featured = featured;
        product.updated_at = OffsetDateTime::now_utc();
        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, id: i64) -> StoreResult<bool> {
        self.record();
        let mut t = self.tables.write().await;
        Ok(t.products.remove(&id).is_some())
    }
}
