use axum::extract::State;
use futures::Stream;
use secondtry_models::{BuildChunk, BuildInput};

use crate::{
    api::ApiTag,
    errors::AppError,
    input::{AppJson, StreamType},
    responses::StreamResponse,
    state::AppState,
};

pub fn route() -> aide::axum::routing::ApiMethodRouter<AppState> {
    aide::axum::routing::post_with(handler, |op| {
        op.id("build_image")
            .tag(ApiTag::Build.into())
            .summary("Build image")
            .description(
                "Build the application image from a build context and stream the progress. \
                The image is only tagged if every step succeeds.",
            )
    })
}

async fn handler(
    State(state): State<AppState>,
    stream_type: StreamType,
    AppJson(input): AppJson<BuildInput>,
) -> Result<StreamResponse<impl Stream<Item = BuildChunk>, BuildChunk>, AppError> {
    let stream = state.builder.build(input).await?;

    Ok(StreamResponse::new(stream, stream_type))
}
