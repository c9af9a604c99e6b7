use aide::axum::routing::ApiMethodRouter;
use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    api::{ApiTag, builds::BuildIdPath},
    builder::BuildRecord,
    errors::AppError,
    state::AppState,
};

pub fn route() -> ApiMethodRouter<AppState> {
    aide::axum::routing::get_with(handler, |op| {
        op.id("get_build")
            .tag(ApiTag::Build.into())
            .summary("Get build")
            .description("Get the stage and status of a build")
    })
}

async fn handler(
    State(state): State<AppState>,
    Path(BuildIdPath { id }): Path<BuildIdPath>,
) -> Result<Json<BuildRecord>, AppError> {
    match state.builder.registry().get(&id).await {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::NotFound),
    }
}
