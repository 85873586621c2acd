use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, warn};

use super::dto::{ListQuery, ProductListResponse, ProductView};
use super::params::ProductParams;
use super::repo_types::{Product, ProductFilter};
use crate::cache::Lookup;
use crate::error::AppError;
use crate::pagination::{PageMeta, PageRequest};
use crate::state::AppState;

/// Result of a feature/unfeature request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureOutcome {
    Changed(Product),
    /// Already in the requested state; nothing was written or invalidated.
    Unchanged(Product),
}

fn truthy(v: Option<&str>) -> bool {
    matches!(
        v.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "t" | "yes" | "on")
    )
}

/// `None` when the category filter can match nothing (non-numeric id).
fn filter_from(q: &ListQuery) -> Option<ProductFilter> {
    let category_id = match q.category_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<i64>().ok()?),
    };
    Some(ProductFilter {
        category_id,
        featured: truthy(q.featured.as_deref()),
        published: truthy(q.published.as_deref()),
        in_stock: truthy(q.in_stock.as_deref()),
    })
}

/// Resolves category names for `products` with a single batched store call.
pub async fn with_category_names(
    st: &AppState,
    products: Vec<Product>,
) -> Result<Vec<ProductView>, AppError> {
    let ids: Vec<i64> = products
        .iter()
        .filter_map(|p| p.category_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let names: HashMap<i64, String> = if ids.is_empty() {
        HashMap::new()
    } else {
        st.store
            .categories_by_ids(&ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect()
    };

    Ok(products
        .into_iter()
        .map(|p| {
            let name = p.category_id.and_then(|id| names.get(&id).cloned());
            ProductView::new(p, name)
        })
        .collect())
}

async fn view_of(st: &AppState, product: Product) -> Result<ProductView, AppError> {
    let name = match product.category_id {
        Some(id) => st.store.find_category(id).await?.map(|c| c.name),
        None => None,
    };
    Ok(ProductView::new(product, name))
}

pub async fn list_products(st: &AppState, q: &ListQuery) -> Result<ProductListResponse, AppError> {
    let page = PageRequest::from_raw(q.page.as_deref(), q.per_page.as_deref());

    let Some(filter) = filter_from(q) else {
        debug!(category_id = ?q.category_id, "unparseable category filter, empty page");
        return Ok(ProductListResponse {
            products: Vec::new(),
            pagination: PageMeta::new(page, 0),
        });
    };

    let total = st.store.count_products(&filter).await?;
    let rows = if total > page.offset() {
        st.store
            .list_products(&filter, page.per_page, page.offset())
            .await?
    } else {
        Vec::new()
    };
    let products = with_category_names(st, rows).await?;

    Ok(ProductListResponse {
        products,
        pagination: PageMeta::new(page, total),
    })
}

/// Single lookup through the secondary cache. Cache trouble degrades to a
/// store read.
pub async fn get_product(st: &AppState, id: i64) -> Result<ProductView, AppError> {
    let lease = match st.cache.get(id).await {
        Ok(Lookup::Hit(product)) => return view_of(st, product).await,
        Ok(Lookup::Miss(lease)) => Some(lease),
        Err(e) => {
            warn!(error = %e, product_id = id, "product cache read failed");
            None
        }
    };

    let product = st
        .store
        .find_product(id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    if let Some(lease) = lease {
        if let Err(e) = st.cache.fill(id, lease, &product).await {
            warn!(error = %e, product_id = id, "product cache fill failed");
        }
    }
    view_of(st, product).await
}

/// Drops the cached entry for `id`. Failure is logged, never propagated: the
/// write it follows has already committed.
async fn invalidate(st: &AppState, id: i64) {
    match st.cache.invalidate(id).await {
        Ok(()) => debug!(product_id = id, "product cache invalidated"),
        Err(e) => warn!(error = %e, product_id = id, "product cache invalidation failed"),
    }
}

/// Adds `category: must exist` to the pending errors when the write would point
/// at a category that is not there. A reference left unchanged is not checked.
async fn check_category(
    st: &AppState,
    params: &mut ProductParams,
    previous: Option<i64>,
) -> Result<(), AppError> {
    let target = params.category_id.unwrap_or(previous);
    if let Some(id) = target.filter(|id| Some(*id) != previous) {
        if st.store.find_category(id).await?.is_none() {
            params.errors.add("category", "must exist");
        }
    }
    Ok(())
}

pub async fn create_product(st: &AppState, mut params: ProductParams) -> Result<ProductView, AppError> {
    check_category(st, &mut params, None).await?;
    let fields = params.into_new()?;

    let product = st.store.insert_product(&fields).await?;
    invalidate(st, product.id).await;
    info!(product_id = product.id, "product created");
    view_of(st, product).await
}

pub async fn update_product(
    st: &AppState,
    id: i64,
    mut params: ProductParams,
) -> Result<ProductView, AppError> {
    let existing = st
        .store
        .find_product(id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    check_category(st, &mut params, existing.category_id).await?;
    let fields = params.apply_to(&existing)?;

    let product = st
        .store
        .update_product(id, &fields)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    invalidate(st, id).await;
    info!(product_id = id, "product updated");
    view_of(st, product).await
}

pub async fn destroy_product(st: &AppState, id: i64) -> Result<(), AppError> {
    if !st.store.delete_product(id).await? {
        return Err(AppError::NotFound("Product"));
    }
    invalidate(st, id).await;
    info!(product_id = id, "product deleted");
    Ok(())
}

pub async fn set_featured(st: &AppState, id: i64, featured: bool) -> Result<FeatureOutcome, AppError> {
    let product = st
        .store
        .find_product(id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    if product.is_featured == featured {
        return Ok(FeatureOutcome::Unchanged(product));
    }

    let product = st
        .store
        .set_featured(id, featured)
        .await?
        .ok_or(AppError::NotFound("Product"))?;
    invalidate(st, id).await;
    info!(product_id = id, featured, "product feature flag changed");
    Ok(FeatureOutcome::Changed(product))
}
