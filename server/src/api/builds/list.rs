use aide::axum::routing::ApiMethodRouter;
use axum::{
    Json,
    extract::{Query, State},
};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::{api::ApiTag, builder::BuildRecord, state::AppState};

const DEFAULT_LIMIT: usize = 100;

pub fn route() -> ApiMethodRouter<AppState> {
    aide::axum::routing::get_with(handler, |op| {
        op.id("list_builds")
            .tag(ApiTag::Build.into())
            .summary("List builds")
            .description("List recent builds, newest first")
    })
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ListQuery {
    /// Maximum number of builds returned
    limit: Option<usize>,
}

async fn handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<BuildRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    Json(state.builder.registry().list(limit).await)
}
