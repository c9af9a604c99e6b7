use aide::axum::ApiRouter;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::state::AppState;

mod get;
mod list;

pub fn routes() -> ApiRouter<AppState> {
    ApiRouter::new()
        .api_route("/", list::route())
        .api_route("/{id}", get::route())
}

#[derive(Debug, Deserialize, JsonSchema)]
struct BuildIdPath {
    id: String,
}
