use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Category record in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Validated category input; the only thing a client may set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFields {
    pub name: String,
}
