use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::Value;
use tracing::{debug, instrument};

use super::dto::{FeatureResponse, FeaturedProduct, ListQuery, ProductListResponse, ProductView};
use super::params::ProductParams;
use super::services::{self, FeatureOutcome};
use crate::cache;
use crate::error::{parse_id, AppError};
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route(
            "/products/:id",
            patch(update_product)
                .put(update_product)
                .delete(destroy_product),
        )
        .route("/products/:id/feature", patch(feature_product))
        .route("/products/:id/unfeature", patch(unfeature_product))
}

/// A query string that does not decode is listed with defaults.
#[instrument(skip(state, query))]
pub async fn list_products(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ProductListResponse>, AppError> {
    let q = match query {
        Ok(Query(q)) => q,
        Err(rejection) => {
            debug!(error = %rejection, "undecodable listing query, using defaults");
            ListQuery::default()
        }
    };
    Ok(Json(services::list_products(&state, &q).await?))
}

#[instrument(skip(state, headers))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let id = parse_id(&id, "Product")?;
    let view = services::get_product(&state, id).await?;
    let etag = view.etag();

    if cache::if_none_match(&headers, &etag) {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    let cache_control = format!("public, max-age={}", state.config.http_cache_max_age_secs);
    Ok((
        [(header::ETAG, etag), (header::CACHE_CONTROL, cache_control)],
        Json(view),
    )
        .into_response())
}

#[instrument(skip(state, payload))]
pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductView>), AppError> {
    let Json(body) = payload?;
    let params = ProductParams::permit(&body)?;
    let view = services::create_product(&state, params).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(skip(state, payload))]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ProductView>, AppError> {
    let id = parse_id(&id, "Product")?;
    let Json(body) = payload?;
    let params = ProductParams::permit(&body)?;
    Ok(Json(services::update_product(&state, id, params).await?))
}

#[instrument(skip(state))]
pub async fn destroy_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id, "Product")?;
    services::destroy_product(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn feature_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FeatureResponse>, AppError> {
    let id = parse_id(&id, "Product")?;
    let outcome = services::set_featured(&state, id, true).await?;
    Ok(Json(feature_response(outcome, true)))
}

#[instrument(skip(state))]
pub async fn unfeature_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FeatureResponse>, AppError> {
    let id = parse_id(&id, "Product")?;
    let outcome = services::set_featured(&state, id, false).await?;
    Ok(Json(feature_response(outcome, false)))
}

fn feature_response(outcome: FeatureOutcome, featured: bool) -> FeatureResponse {
    let (message, product, featured_at) = match (outcome, featured) {
        (FeatureOutcome::Changed(p), true) => {
            let at = p.updated_at;
            ("Product successfully featured", p, Some(at))
        }
        (FeatureOutcome::Unchanged(p), true) => ("Product is already featured", p, None),
        (FeatureOutcome::Changed(p), false) => ("Product successfully unfeatured", p, None),
        (FeatureOutcome::Unchanged(p), false) => ("Product is not featured", p, None),
    };
    FeatureResponse {
        message,
        product: FeaturedProduct {
            id: product.id,
            name: product.name,
            is_featured: product.is_featured,
            featured_at,
        },
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::app::build_app;

    async fn send(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        build_app(state.clone()).oneshot(req).await.unwrap()
    }

    async fn json_body(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn seed(state: &AppState) -> (i64, i64) {
        let res = send(state, "POST", "/api/v1/categories", Some(json!({ "category": { "name": "Electronics" } }))).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let category_id = json_body(res).await["id"].as_i64().unwrap();

        let res = send(
            state,
            "POST",
            "/api/v1/products",
            Some(json!({ "product": {
                "name": "Laptop", "price": 100, "stock_quantity": 10, "category_id": category_id
            }})),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let product_id = json_body(res).await["id"].as_i64().unwrap();
        (category_id, product_id)
    }

    #[tokio::test]
    async fn create_then_read_with_category_name() {
        let state = AppState::fake();
        let (category_id, product_id) = seed(&state).await;

        let res = send(&state, "GET", &format!("/api/v1/products/{product_id}"), None).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key(header::ETAG));
        assert_eq!(
            res.headers()[header::CACHE_CONTROL],
            "public, max-age=3600"
        );
        let body = json_body(res).await;
        assert_eq!(body["name"], "Laptop");
        assert_eq!(body["price"], "100.00");
        assert_eq!(body["category_id"], category_id);
        assert_eq!(body["category_name"], "Electronics");
        assert_eq!(body["is_admin"], false);
        assert!(body["published_at"].is_null());
    }

    #[tokio::test]
    async fn conditional_get_short_circuits() {
        let state = AppState::fake();
        let (_, id) = seed(&state).await;
        let uri = format!("/api/v1/products/{id}");

        let first = send(&state, "GET", &uri, None).await;
        let etag = first.headers()[header::ETAG].to_str().unwrap().to_string();

        let req = Request::get(&uri)
            .header(header::IF_NONE_MATCH, &etag)
            .body(Body::empty())
            .unwrap();
        let res = build_app(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(res.headers()[header::ETAG], etag.as_str());
        assert!(to_bytes(res.into_body(), usize::MAX).await.unwrap().is_empty());

        let res = send(&state, "PATCH", &uri, Some(json!({ "product": { "price": "120.50" } }))).await;
        assert_eq!(res.status(), StatusCode::OK);

        let req = Request::get(&uri)
            .header(header::IF_NONE_MATCH, &etag)
            .body(Body::empty())
            .unwrap();
        let res = build_app(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_ne!(res.headers()[header::ETAG], etag.as_str());
        assert_eq!(json_body(res).await["price"], "120.50");
    }

    #[tokio::test]
    async fn admin_flag_is_never_mass_assigned() {
        let state = AppState::fake();
        let (_, id) = seed(&state).await;

        let res = send(
            &state,
            "PATCH",
            &format!("/api/v1/products/{id}"),
            Some(json!({ "product": { "is_admin": true }, "is_admin": true })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["is_admin"], false);
        assert_eq!(body["name"], "Laptop");

        let res = send(
            &state,
            "POST",
            "/api/v1/products",
            Some(json!({ "product": {
                "name": "Phone", "price": 5, "stock_quantity": 1, "is_admin": true
            }})),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(json_body(res).await["is_admin"], false);
    }

    #[tokio::test]
    async fn rejected_update_is_422_and_keeps_cached_read() {
        let state = AppState::fake();
        let (_, id) = seed(&state).await;
        let uri = format!("/api/v1/products/{id}");

        let before = send(&state, "GET", &uri, None).await;
        let etag = before.headers()[header::ETAG].to_str().unwrap().to_string();
        let before = json_body(before).await;

        let res = send(&state, "PATCH", &uri, Some(json!({ "product": { "price": -1, "name": "Changed" } }))).await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            json_body(res).await,
            json!({ "price": ["must be greater than or equal to 0"] })
        );

        let res = send(&state, "PUT", &uri, Some(json!({ "product": { "category_id": 999, "name": "" } }))).await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            json_body(res).await,
            json!({ "category": ["must exist"], "name": ["can't be blank"] })
        );

        let after = send(&state, "GET", &uri, None).await;
        assert_eq!(after.headers()[header::ETAG], etag.as_str());
        let after = json_body(after).await;
        assert_eq!(after, before);
        assert_eq!(after["updated_at"], before["updated_at"]);
    }

    #[tokio::test]
    async fn undecodable_listing_query_falls_back_to_defaults() {
        let state = AppState::fake();
        seed(&state).await;
        let res = send(&state, "GET", "/api/v1/products?page=1&page=2", None).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["pagination"]["current_page"], 1);
        assert_eq!(body["pagination"]["per_page"], 25);
        assert_eq!(body["pagination"]["total_count"], 1);
    }

    #[tokio::test]
    async fn empty_product_object_is_400() {
        let state = AppState::fake();
        let res = send(&state, "POST", "/api/v1/products", Some(json!({ "product": {} }))).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn validation_failures_are_422_field_maps() {
        let state = AppState::fake();
        let res = send(
            &state,
            "POST",
            "/api/v1/products",
            Some(json!({ "product": { "name": "", "price": -10, "stock_quantity": 1 } })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            json_body(res).await,
            json!({
                "name": ["can't be blank"],
                "price": ["must be greater than or equal to 0"],
            })
        );

        let res = send(&state, "GET", "/api/v1/products", None).await;
        assert_eq!(json_body(res).await["pagination"]["total_count"], 0);
    }

    #[tokio::test]
    async fn missing_root_and_malformed_bodies_are_400() {
        let state = AppState::fake();
        let res = send(&state, "POST", "/api/v1/products", Some(json!({ "name": "Laptop" }))).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(res).await["error"],
            "param is missing or the value is empty: product"
        );

        let req = Request::post("/api/v1/products")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = build_app(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_products_are_404() {
        let state = AppState::fake();
        for (method, uri) in [
            ("GET", "/api/v1/products/99"),
            ("GET", "/api/v1/products/abc"),
            ("DELETE", "/api/v1/products/99"),
            ("PATCH", "/api/v1/products/99/feature"),
        ] {
            let res = send(&state, method, uri, None).await;
            assert_eq!(res.status(), StatusCode::NOT_FOUND, "{method} {uri}");
            assert_eq!(json_body(res).await["error"], "Product not found");
        }
        let res = send(
            &state,
            "PUT",
            "/api/v1/products/99",
            Some(json!({ "product": { "name": "x" } })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_then_read_is_404() {
        let state = AppState::fake();
        let (_, id) = seed(&state).await;
        let uri = format!("/api/v1/products/{id}");

        assert_eq!(send(&state, "GET", &uri, None).await.status(), StatusCode::OK);
        let res = send(&state, "DELETE", &uri, None).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(to_bytes(res.into_body(), usize::MAX).await.unwrap().is_empty());
        assert_eq!(send(&state, "GET", &uri, None).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn feature_and_unfeature_messages() {
        let state = AppState::fake();
        let (_, id) = seed(&state).await;

        let body = json_body(send(&state, "PATCH", &format!("/api/v1/products/{id}/feature"), None).await).await;
        assert_eq!(body["message"], "Product successfully featured");
        assert_eq!(body["product"]["is_featured"], true);
        assert!(body["product"]["featured_at"].is_string());

        let body = json_body(send(&state, "PATCH", &format!("/api/v1/products/{id}/feature"), None).await).await;
        assert_eq!(body["message"], "Product is already featured");
        assert!(body["product"].get("featured_at").is_none());

        let body = json_body(send(&state, "PATCH", &format!("/api/v1/products/{id}/unfeature"), None).await).await;
        assert_eq!(body["message"], "Product successfully unfeatured");
        assert_eq!(body["product"]["is_featured"], false);

        let body = json_body(send(&state, "PATCH", &format!("/api/v1/products/{id}/unfeature"), None).await).await;
        assert_eq!(body["message"], "Product is not featured");
        assert_eq!(body["product"], json!({ "id": id, "name": "Laptop", "is_featured": false }));
    }

    #[tokio::test]
    async fn list_filters_and_pagination_over_http() {
        let state = AppState::fake();
        let (category_id, _) = seed(&state).await;
        for i in 0..4 {
            send(
                &state,
                "POST",
                "/api/v1/products",
                Some(json!({ "product": { "name": format!("Loose {i}"), "price": 1, "stock_quantity": 0 } })),
            )
            .await;
        }

        let body = json_body(send(&state, "GET", "/api/v1/products?per_page=2&page=2", None).await).await;
        assert_eq!(body["products"].as_array().unwrap().len(), 2);
        assert_eq!(
            body["pagination"],
            json!({
                "current_page": 2, "total_pages": 3, "total_count": 5,
                "per_page": 2, "next_page": 3, "prev_page": 1
            })
        );

        let body = json_body(
            send(&state, "GET", &format!("/api/v1/products?category_id={category_id}"), None).await,
        )
        .await;
        assert_eq!(body["pagination"]["total_count"], 1);
        assert_eq!(body["products"][0]["category_name"], "Electronics");

        let body = json_body(send(&state, "GET", "/api/v1/products?category_id=", None).await).await;
        assert_eq!(body["pagination"]["total_count"], 5);

        let body = json_body(send(&state, "GET", "/api/v1/products?in_stock=true", None).await).await;
        assert_eq!(body["pagination"]["total_count"], 1);

        let body = json_body(send(&state, "GET", "/api/v1/products?page=0&per_page=500", None).await).await;
        assert_eq!(body["pagination"]["current_page"], 1);
        assert_eq!(body["pagination"]["per_page"], 100);
    }
}
