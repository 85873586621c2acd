use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::Value;
use tracing::instrument;

use super::dto::{CategoryDetail, CategorySummary};
use super::repo_types::Category;
use super::services;
use crate::error::{parse_id, AppError};
use crate::state::AppState;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/categories/:id", get(get_category))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", post(create_category))
        .route(
            "/categories/:id",
            patch(update_category)
                .put(update_category)
                .delete(destroy_category),
        )
}

#[instrument(skip(state))]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategorySummary>>, AppError> {
    Ok(Json(services::list_categories(&state).await?))
}

#[instrument(skip(state))]
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CategoryDetail>, AppError> {
    let id = parse_id(&id, "Category")?;
    Ok(Json(services::get_category(&state, id).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_category(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let Json(body) = payload?;
    let name = services::permit(&body)?;
    let category = services::create_category(&state, name).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[instrument(skip(state, payload))]
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Category>, AppError> {
    let id = parse_id(&id, "Category")?;
    let Json(body) = payload?;
    let name = services::permit(&body)?;
    Ok(Json(services::update_category(&state, id, name).await?))
}

#[instrument(skip(state))]
pub async fn destroy_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id, "Category")?;
    services::destroy_category(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
