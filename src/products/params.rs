//! Allow-listed product input.
//!
//! Raw request bodies never reach the entity. [`ProductParams::permit`] reads
//! the permitted keys one by one out of `{"product": {...}}` and everything
//! else in the payload (`is_admin`, `id`, timestamps, unknown keys) is dropped.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::repo_types::{Product, ProductFields};
use crate::error::{AppError, ValidationErrors};

const NOT_A_NUMBER: &str = "is not a number";
const MAX_PRICE: i64 = 100_000_000;

/// Sanitized input. For each field the outer `Option` is "key present"; the
/// inner one is "value given" (null, blank or uncoercible values are `None`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductParams {
    pub name: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub price: Option<Option<Decimal>>,
    pub stock_quantity: Option<Option<i64>>,
    pub category_id: Option<Option<i64>>,
    pub published_at: Option<Option<OffsetDateTime>>,
    pub is_featured: Option<bool>,
    /// Type errors found while coercing the raw values.
    pub errors: ValidationErrors,
}

/// The non-empty `{root: {...}}` object of a request body, or 400.
pub fn require_object<'a>(body: &'a Value, root: &str) -> Result<&'a Map<String, Value>, AppError> {
    body.get(root)
        .and_then(Value::as_object)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("param is missing or the value is empty: {root}")))
}

impl ProductParams {
    pub fn permit(body: &Value) -> Result<Self, AppError> {
        let raw = require_object(body, "product")?;
        let mut params = Self::default();

        if let Some(v) = raw.get("name") {
            params.name = Some(string(v));
        }
        if let Some(v) = raw.get("description") {
            params.description = Some(string(v));
        }
        if let Some(v) = raw.get("price") {
            params.price = Some(decimal(v));
        }
        if let Some(v) = raw.get("stock_quantity") {
            let (n, err) = integer(v);
            if let Some(msg) = err {
                params.errors.add("stock_quantity", msg);
            }
            params.stock_quantity = Some(n);
        }
        if let Some(v) = raw.get("category_id") {
            let (id, err) = integer(v);
            if let Some(msg) = err {
                params.errors.add("category_id", msg);
            }
            params.category_id = Some(id);
        }
        if let Some(v) = raw.get("published_at") {
            match timestamp(v) {
                Ok(ts) => params.published_at = Some(ts),
                Err(msg) => params.errors.add("published_at", msg),
            }
        }
        if let Some(v) = raw.get("is_featured") {
            match boolean(v) {
                Some(b) => params.is_featured = Some(b),
                None => params.errors.add("is_featured", "is not a boolean"),
            }
        }
        Ok(params)
    }

    /// Validated state for a new product: unset fields take their defaults.
    pub fn into_new(self) -> Result<ProductFields, ValidationErrors> {
        let draft = Draft {
            name: self.name.flatten(),
            description: self.description.flatten(),
            price: self.price.flatten(),
            stock_quantity: self.stock_quantity.flatten(),
            category_id: self.category_id.flatten(),
            published_at: self.published_at.flatten(),
            is_featured: self.is_featured.unwrap_or(false),
        };
        draft.validate(self.errors)
    }

    /// Validated state for `existing` with only the present fields changed.
    pub fn apply_to(self, existing: &Product) -> Result<ProductFields, ValidationErrors> {
        let draft = Draft {
            name: self.name.unwrap_or_else(|| Some(existing.name.clone())),
            description: self.description.unwrap_or_else(|| existing.description.clone()),
            price: self.price.unwrap_or(Some(existing.price)),
            stock_quantity: self
                .stock_quantity
                .unwrap_or(Some(i64::from(existing.stock_quantity))),
            category_id: self.category_id.unwrap_or(existing.category_id),
            published_at: self.published_at.unwrap_or(existing.published_at),
            is_featured: self.is_featured.unwrap_or(existing.is_featured),
        };
        draft.validate(self.errors)
    }
}

struct Draft {
    name: Option<String>,
    description: Option<String>,
    price: Option<Decimal>,
    stock_quantity: Option<i64>,
    category_id: Option<i64>,
    published_at: Option<OffsetDateTime>,
    is_featured: bool,
}

impl Draft {
    fn validate(self, mut errors: ValidationErrors) -> Result<ProductFields, ValidationErrors> {
        let name = self.name.filter(|n| !n.trim().is_empty());
        if name.is_none() {
            errors.add("name", "can't be blank");
        }

        let price = self
            .price
            .map(|p| p.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero));
        match price {
            None => errors.add("price", NOT_A_NUMBER),
            Some(p) if p.is_sign_negative() && !p.is_zero() => {
                errors.add("price", "must be greater than or equal to 0")
            }
            Some(p) if p >= Decimal::from(MAX_PRICE) => {
                errors.add("price", format!("must be less than {MAX_PRICE}"))
            }
            Some(_) => {}
        }

        let mut stock = None;
        if !errors.has("stock_quantity") {
            match self.stock_quantity {
                None => errors.add("stock_quantity", NOT_A_NUMBER),
                Some(n) if n < 0 => errors.add("stock_quantity", "must be greater than or equal to 0"),
                Some(n) => match i32::try_from(n) {
                    Ok(n) => stock = Some(n),
                    Err(_) => errors.add(
                        "stock_quantity",
                        format!("must be less than or equal to {}", i32::MAX),
                    ),
                },
            }
        }

        match (name, price, stock) {
            (Some(name), Some(price), Some(stock_quantity)) if errors.is_empty() => Ok(ProductFields {
                name,
                description: self.description,
                price,
                stock_quantity,
                category_id: self.category_id,
                published_at: self.published_at,
                is_featured: self.is_featured,
            }),
            _ => Err(errors),
        }
    }
}

fn string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Integer coercion. Null and empty strings are "no value"; anything else that
/// is not a whole number also yields no value plus a message.
fn integer(value: &Value) -> (Option<i64>, Option<&'static str>) {
    match value {
        Value::Null => (None, None),
        Value::String(s) if s.trim().is_empty() => (None, None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                (Some(i), None)
            } else if n.as_f64().is_some_and(|f| f.fract() != 0.0) {
                (None, Some("must be an integer"))
            } else {
                match n.as_f64() {
                    Some(f) if f.abs() < i64::MAX as f64 => (Some(f as i64), None),
                    _ => (None, Some(NOT_A_NUMBER)),
                }
            }
        }
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(i) => (Some(i), None),
            Err(_) if decimal(value).is_some() => (None, Some("must be an integer")),
            Err(_) => (None, Some(NOT_A_NUMBER)),
        },
        _ => (None, Some(NOT_A_NUMBER)),
    }
}

fn timestamp(value: &Value) -> Result<Option<OffsetDateTime>, &'static str> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => OffsetDateTime::parse(s.trim(), &Rfc3339)
            .map(Some)
            .map_err(|_| "is not a valid datetime"),
        _ => Err("is not a valid datetime"),
    }
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Null => Some(false),
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(true),
            "false" | "f" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
