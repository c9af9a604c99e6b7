//! Request extractors for API handlers

use axum::{http::StatusCode, response::IntoResponse};
use serde::Serialize;

mod json;
mod stream_type;

pub use json::AppJson;
pub use stream_type::StreamType;

/// Rejection for request bodies that fail to parse or validate
#[derive(Debug, Serialize)]
pub struct InputValidationError {
    message: String,
    /// Fields that failed validation, sorted
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<String>,
}

impl InputValidationError {
    fn parse(message: String) -> Self {
        Self {
            message,
            fields: Vec::new(),
        }
    }

    fn invalid(errors: &validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|field| field.to_string())
            .collect();
        fields.sort();
        Self {
            message: errors.to_string(),
            fields,
        }
    }
}

impl IntoResponse for InputValidationError {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(self)).into_response()
    }
}
