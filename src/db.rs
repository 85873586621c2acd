use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};

use crate::categories::repo_types::{Category, CategoryFields};
use crate::config::AppConfig;
use crate::products::repo_types::{Product, ProductFields, ProductFilter};
use crate::storage::{CatalogStore, StoreError, StoreResult};

const CATEGORY_COLUMNS: &str = "id, name, created_at, updated_at";
const PRODUCT_COLUMNS: &str = "id, name, description, price, stock_quantity, category_id, \
     published_at, is_featured, is_admin, created_at, updated_at";

/// PostgreSQL-backed catalog store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL is required for the postgres store")?;
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_db_err(e: sqlx::Error) -> StoreError {
    if let Some(db) = e.as_database_error() {
        let constraint = db.constraint().unwrap_or_default().to_string();
        match db.code().as_deref() {
            Some("23505") => return StoreError::UniqueViolation(constraint),
            Some("23503") => return StoreError::ForeignKeyViolation(constraint),
            _ => {}
        }
    }
    StoreError::Database(e)
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    qb.push(" WHERE TRUE");
    if let Some(category_id) = filter.category_id {
        qb.push(" AND category_id = ").push_bind(category_id);
    }
    if filter.featured {
        qb.push(" AND is_featured");
    }
    if filter.published {
        qb.push(" AND published_at IS NOT NULL");
    }
    if filter.in_stock {
        qb.push(" AND stock_quantity > 0");
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(rows)
    }

    async fn find_category(&self, id: i64) -> StoreResult<Option<Category>> {
        sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn find_category_by_name(&self, name: &str) -> StoreResult<Option<Category>> {
        sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn categories_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Category>> {
        sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn insert_category(&self, fields: &CategoryFields) -> StoreResult<Category> {
        sqlx::query_as::<_, Category>(&format!(
            "INSERT INTO categories (name) VALUES ($1) RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(&fields.name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn update_category(&self, id: i64, fields: &CategoryFields) -> StoreResult<Option<Category>> {
        sqlx::query_as::<_, Category>(&format!(
            r#"
            UPDATE categories SET name = $2, updated_at = now()
            WHERE id = $1
            RETURNING {CATEGORY_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&fields.name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn delete_category(&self, id: i64) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn product_counts_by_category(&self) -> StoreResult<HashMap<i64, i64>> {
        let rows = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT category_id, COUNT(*)
            FROM products
            WHERE category_id IS NOT NULL
            GROUP BY category_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(rows.into_iter().collect())
    }

    async fn count_products(&self, filter: &ProductFilter) -> StoreResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_filter(&mut qb, filter);
        let (count,): (i64,) = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(count)
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Product>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        qb.build_query_as::<Product>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_err)
    }

    async fn products_in_category(&self, category_id: i64) -> StoreResult<Vec<Product>> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE category_id = $1 ORDER BY id"
        ))
        .bind(category_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn find_product(&self, id: i64) -> StoreResult<Option<Product>> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn insert_product(&self, fields: &ProductFields) -> StoreResult<Product> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products
                (name, description, price, stock_quantity, category_id, published_at, is_featured)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(fields.price)
        .bind(fields.stock_quantity)
        .bind(fields.category_id)
        .bind(fields.published_at)
        .bind(fields.is_featured)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn update_product(&self, id: i64, fields: &ProductFields) -> StoreResult<Option<Product>> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products SET
                name = $2, description = $3, price = $4, stock_quantity = $5,
                category_id = $6, published_at = $7, is_featured = $8, updated_at = now()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(fields.price)
        .bind(fields.stock_quantity)
        .bind(fields.category_id)
        .bind(fields.published_at)
        .bind(fields.is_featured)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn set_featured(&self, id: i64, featured: bool) -> StoreResult<Option<Product>> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products SET is_featured = $2, updated_at = now()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(featured)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)
    }

    async fn delete_product(&self, id: i64) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(res.rows_affected() > 0)
    }
}
