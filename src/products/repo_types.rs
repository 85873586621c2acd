use rust_decimal::Decimal;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Product record in the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock_quantity: i32,
    pub category_id: Option<i64>, // may dangle; resolved to no category on read
    pub published_at: Option<OffsetDateTime>,
    pub is_featured: bool,
    pub is_admin: bool, // never written by any client-driven path
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Product {
    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    pub fn in_stock(&self) -> bool {
        self.stock_quantity > 0
    }
}

/// Validated, writable product state. Stores persist exactly these columns;
/// `is_admin` is not among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFields {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock_quantity: i32,
    pub category_id: Option<i64>,
    pub published_at: Option<OffsetDateTime>,
    pub is_featured: bool,
}

/// Row restrictions for product listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub category_id: Option<i64>,
    pub featured: bool,
    pub published: bool,
    pub in_stock: bool,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        self.category_id.map_or(true, |id| product.category_id == Some(id))
            && (!self.featured || product.is_featured)
            && (!self.published || product.is_published())
            && (!self.in_stock || product.in_stock())
    }
}
