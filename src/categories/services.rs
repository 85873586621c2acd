use serde_json::Value;
use tracing::info;

use super::dto::{CategoryDetail, CategorySummary};
use super::repo_types::{Category, CategoryFields};
use crate::error::{AppError, ValidationErrors};
use crate::products::dto::ProductView;
use crate::products::params::require_object;
use crate::state::AppState;
use crate::storage::StoreError;

const IN_USE: &str = "Cannot delete category with associated products";

/// Allow-listed category input: only `name` is read out of `{"category": {...}}`.
/// `None` means the key was absent.
pub fn permit(body: &Value) -> Result<Option<String>, AppError> {
    let raw = require_object(body, "category")?;
    Ok(raw.get("name").map(|v| match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }))
}

fn taken() -> AppError {
    ValidationErrors::single("name", "has already been taken").into()
}

async fn validate_name(st: &AppState, name: &str, own_id: Option<i64>) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(ValidationErrors::single("name", "can't be blank").into());
    }
    match st.store.find_category_by_name(name).await? {
        Some(other) if Some(other.id) != own_id => Err(taken()),
        _ => Ok(()),
    }
}

fn unique_to_validation(err: StoreError) -> AppError {
    match err {
        StoreError::UniqueViolation(_) => taken(),
        other => other.into(),
    }
}

pub async fn list_categories(st: &AppState) -> Result<Vec<CategorySummary>, AppError> {
    let categories = st.store.list_categories().await?;
    let counts = st.store.product_counts_by_category().await?;
    Ok(categories
        .into_iter()
        .map(|c| {
            let count = counts.get(&c.id).copied().unwrap_or(0);
            CategorySummary::new(c, count)
        })
        .collect())
}

pub async fn get_category(st: &AppState, id: i64) -> Result<CategoryDetail, AppError> {
    let category = st
        .store
        .find_category(id)
        .await?
        .ok_or(AppError::NotFound("Category"))?;
    let products = st
        .store
        .products_in_category(id)
        .await?
        .into_iter()
        .map(|p| ProductView::new(p, Some(category.name.clone())))
        .collect();
    Ok(CategoryDetail {
        id: category.id,
        name: category.name,
        created_at: category.created_at,
        updated_at: category.updated_at,
        products,
    })
}

pub async fn create_category(st: &AppState, name: Option<String>) -> Result<Category, AppError> {
    let name = name.unwrap_or_default();
    validate_name(st, &name, None).await?;
    let category = st
        .store
        .insert_category(&CategoryFields { name })
        .await
        .map_err(unique_to_validation)?;
    info!(category_id = category.id, "category created");
    Ok(category)
}

pub async fn update_category(
    st: &AppState,
    id: i64,
    name: Option<String>,
) -> Result<Category, AppError> {
    let existing = st
        .store
        .find_category(id)
        .await?
        .ok_or(AppError::NotFound("Category"))?;
    let Some(name) = name else {
        return Ok(existing);
    };
    validate_name(st, &name, Some(id)).await?;

    let category = st
        .store
        .update_category(id, &CategoryFields { name })
        .await
        .map_err(unique_to_validation)?
        .ok_or(AppError::NotFound("Category"))?;
    info!(category_id = id, "category updated");
    Ok(category)
}

pub async fn destroy_category(st: &AppState, id: i64) -> Result<(), AppError> {
    if st.store.find_category(id).await?.is_none() {
        return Err(AppError::NotFound("Category"));
    }
    match st.store.delete_category(id).await {
        Ok(true) => {
            info!(category_id = id, "category deleted");
            Ok(())
        }
        Ok(false) => Err(AppError::NotFound("Category")),
        Err(StoreError::ForeignKeyViolation(_)) => Err(AppError::ReferentialIntegrity(IN_USE.into())),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::storage::fixtures::{category, fields};
    use crate::storage::{CatalogStore, MemoryStore};
    use crate::{cache::NoopCache, config::AppConfig};
    use std::sync::Arc;

    fn state() -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let st = AppState::from_parts(store.clone(), Arc::new(NoopCache), Arc::new(AppConfig::default()));
        (st, store)
    }

    #[test]
    fn permit_reads_only_name() {
        let name = permit(&json!({ "category": { "name": "Books", "id": 7, "created_at": "x" } })).unwrap();
        assert_eq!(name.as_deref(), Some("Books"));
        assert_eq!(permit(&json!({ "category": { "id": 7 } })).unwrap(), None);
        assert!(matches!(permit(&json!({ "category": {} })), Err(AppError::BadRequest(_))));
        assert!(matches!(permit(&json!({ "name": "Books" })), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn counts_come_from_one_grouped_query() {
        let (st, store) = state();
        let a = category(store.as_ref(), "A").await;
        let b = category(store.as_ref(), "B").await;
        category(store.as_ref(), "Empty").await;
        for i in 0..6 {
            let cat = if i < 4 { a.id } else { b.id };
            store.insert_product(&fields(&format!("P{i}"), 1, 1, Some(cat))).await.unwrap();
        }

        let before = store.query_count();
        let list = list_categories(&st).await.unwrap();
        assert_eq!(store.query_count() - before, 2);
        let counts: Vec<_> = list.iter().map(|c| (c.name.as_str(), c.products_count)).collect();
        assert_eq!(counts, vec![("A", 4), ("B", 2), ("Empty", 0)]);
    }

    #[tokio::test]
    async fn detail_embeds_products_without_extra_lookups() {
        let (st, store) = state();
        let a = category(store.as_ref(), "Electronics").await;
        for i in 0..3 {
            store.insert_product(&fields(&format!("P{i}"), 1, 1, Some(a.id))).await.unwrap();
        }

        let before = store.query_count();
        let detail = get_category(&st, a.id).await.unwrap();
        assert_eq!(store.query_count() - before, 2);
        assert_eq!(detail.products.len(), 3);
        assert!(detail
            .products
            .iter()
            .all(|p| p.category_name.as_deref() == Some("Electronics")));
        assert!(matches!(get_category(&st, 99).await, Err(AppError::NotFound("Category"))));
    }

    #[tokio::test]
    async fn names_must_be_present_and_unique() {
        let (st, _) = state();
        create_category(&st, Some("Books".into())).await.unwrap();

        for bad in [None, Some(String::new()), Some("   ".into())] {
            match create_category(&st, bad).await.unwrap_err() {
                AppError::Validation(e) => assert_eq!(e.get("name").unwrap(), ["can't be blank"]),
                other => panic!("unexpected {other:?}"),
            }
        }
        match create_category(&st, Some("Books".into())).await.unwrap_err() {
            AppError::Validation(e) => assert_eq!(e.get("name").unwrap(), ["has already been taken"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_renames_and_keeps_own_name() {
        let (st, _) = state();
        let books = create_category(&st, Some("Books".into())).await.unwrap();
        let music = create_category(&st, Some("Music".into())).await.unwrap();

        assert!(matches!(
            update_category(&st, music.id, Some("Books".into())).await,
            Err(AppError::Validation(_))
        ));
        let same = update_category(&st, books.id, Some("Books".into())).await.unwrap();
        assert_eq!(same.name, "Books");
        let renamed = update_category(&st, music.id, Some("Records".into())).await.unwrap();
        assert_eq!(renamed.name, "Records");
        let untouched = update_category(&st, music.id, None).await.unwrap();
        assert_eq!(untouched.name, "Records");
        assert!(matches!(
            update_category(&st, 99, Some("x".into())).await,
            Err(AppError::NotFound("Category"))
        ));
    }

    #[tokio::test]
    async fn referenced_category_is_not_deleted() {
        let (st, store) = state();
        let a = category(store.as_ref(), "A").await;
        let p = store.insert_product(&fields("P", 1, 1, Some(a.id))).await.unwrap();

        match destroy_category(&st, a.id).await.unwrap_err() {
            AppError::ReferentialIntegrity(msg) => assert_eq!(msg, IN_USE),
            other => panic!("unexpected {other:?}"),
        }
        assert!(store.find_category(a.id).await.unwrap().is_some());

        store.delete_product(p.id).await.unwrap();
        destroy_category(&st, a.id).await.unwrap();
        assert!(matches!(destroy_category(&st, a.id).await, Err(AppError::NotFound(_))));
    }
}
