use aide::OperationOutput;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use secondtry_models::BuildErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Docker client error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("Build failed: {0}")]
    Build(#[from] BuildError),
}

/// A fatal build failure. No part of the build is retried after one of these.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BuildError {
    pub kind: BuildErrorKind,
    pub message: String,
}

impl BuildError {
    pub fn new(kind: BuildErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Build(err) => match err.kind {
                BuildErrorKind::Recipe => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
                BuildErrorKind::ManifestMissing | BuildErrorKind::Dependencies => {
                    (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()).into_response()
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
            },
            AppError::Docker(err) => {
                tracing::error!("Docker client error: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

impl OperationOutput for AppError {
    type Inner = String;
}
