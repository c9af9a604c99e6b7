use axum::extract::State;
use futures::Stream;
use secondtry_models::{LaunchChunk, LaunchInput};

use crate::{
    api::ApiTag,
    errors::AppError,
    input::{AppJson, StreamType},
    responses::StreamResponse,
    state::AppState,
};

pub fn route() -> aide::axum::routing::ApiMethodRouter<AppState> {
    aide::axum::routing::post_with(handler, |op| {
        op.id("launch_image")
            .tag(ApiTag::Launch.into())
            .summary("Launch image")
            .description(
                "Start a container from a built image and stream its output until the process \
                exits. The image's entry command runs unless a command is given.",
            )
    })
}

async fn handler(
    State(state): State<AppState>,
    stream_type: StreamType,
    AppJson(input): AppJson<LaunchInput>,
) -> Result<StreamResponse<impl Stream<Item = LaunchChunk>, LaunchChunk>, AppError> {
    let stream = state.builder.launch(input).await?;

    Ok(StreamResponse::new(stream, stream_type))
}
