//! Request-level error taxonomy and its HTTP mapping.

use std::collections::BTreeMap;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::storage::StoreError;

/// Field name -> human readable messages, serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("validation failed")]
    Validation(ValidationErrors),

    #[error("{0}")]
    ReferentialIntegrity(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Path ids that are not integers can never match a record.
pub fn parse_id(raw: &str, resource: &'static str) -> Result<i64, AppError> {
    raw.parse().map_err(|_| AppError::NotFound(resource))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("{resource} not found") })),
            )
                .into_response(),
            Self::Validation(errors) => (StatusCode::UNPROCESSABLE_ENTITY, Json(errors)).into_response(),
            Self::ReferentialIntegrity(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": message })),
            )
                .into_response(),
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::Store(err) => match err {
                StoreError::UniqueViolation(_) | StoreError::ForeignKeyViolation(_) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "error": err.to_string() })),
                )
                    .into_response(),
                StoreError::Database(ref e) => {
                    error!(error = %e, "store operation failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": "Internal server error" })),
                    )
                        .into_response()
                }
            },
        }
    }
}
