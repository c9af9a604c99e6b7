use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "X-Builder-Api-Key";

/// Extractor guarding every API route. Rejects requests without the configured API key.
pub struct ApiKey;

#[derive(Debug, PartialEq, Eq)]
pub enum ApiKeyError {
    Missing,
    Invalid,
}

impl IntoResponse for ApiKeyError {
    fn into_response(self) -> Response {
        // Same response either way, the reason is only logged
        tracing::debug!("Rejected request: {self:?} API key");
        (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
    }
}

fn check_api_key(headers: &HeaderMap, expected: &str) -> Result<(), ApiKeyError> {
    let provided = headers.get(API_KEY_HEADER).ok_or(ApiKeyError::Missing)?;
    match provided.to_str() {
        Ok(key) if !expected.is_empty() && key == expected => Ok(()),
        _ => Err(ApiKeyError::Invalid),
    }
}

impl FromRequestParts<AppState> for ApiKey {
    type Rejection = ApiKeyError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        check_api_key(&parts.headers, &state.config.api_key).map(|_| ApiKey)
    }
}
