use std::marker::PhantomData;

use aide::{
    OperationOutput,
    generate::GenContext,
    openapi::{MediaType, Operation, Response, SchemaObject},
};
use axum::{
    Json,
    response::{
        IntoResponse, Sse,
        sse::{Event, KeepAlive},
    },
};
use axum_streams::StreamBodyAs;
use futures::{Stream, StreamExt};
use schemars::JsonSchema;
use serde::Serialize;

use crate::input::StreamType;

/// Media types a stream response can be sent as
const STREAM_MEDIA_TYPES: [&str; 2] = ["text/event-stream", "application/jsonl"];

/// A stream of events sent as SSE or JSON Lines. The event type is documented in the
/// OpenAPI specification for both media types.
pub struct StreamResponse<S, Chunk> {
    stream: S,
    stream_type: StreamType,
    chunk: PhantomData<fn() -> Chunk>,
}

impl<S, Chunk> StreamResponse<S, Chunk>
where
    S: Stream<Item = Chunk> + Send + 'static,
{
    pub fn new(stream: S, stream_type: StreamType) -> Self {
        Self {
            stream,
            stream_type,
            chunk: PhantomData,
        }
    }
}

impl<S, Chunk> IntoResponse for StreamResponse<S, Chunk>
where
    S: Stream<Item = Chunk> + Send + 'static,
    Chunk: Serialize + Send + Sync + 'static,
{
    fn into_response(self) -> axum::response::Response {
        match self.stream_type {
            // Builds can go quiet for minutes while dependencies install
            StreamType::Sse => Sse::new(self.stream.map(|chunk| Event::default().json_data(chunk)))
                .keep_alive(KeepAlive::default())
                .into_response(),
            StreamType::Jsonl => StreamBodyAs::json_nl(self.stream).into_response(),
        }
    }
}

impl<S, Chunk> OperationOutput for StreamResponse<S, Chunk>
where
    Chunk: JsonSchema,
{
    type Inner = Chunk;

    fn operation_response(ctx: &mut GenContext, operation: &mut Operation) -> Option<Response> {
        let mut response = Json::<Chunk>::operation_response(ctx, operation)?;
        let schema = SchemaObject {
            json_schema: ctx.schema.subschema_for::<Chunk>(),
            example: None,
            external_docs: None,
        };
        response.content = STREAM_MEDIA_TYPES
            .into_iter()
            .map(|mime| {
                let media = MediaType {
                    schema: Some(schema.clone()),
                    ..Default::default()
                };
                (mime.to_owned(), media)
            })
            .collect();
        Some(response)
    }

    fn inferred_responses(
        ctx: &mut GenContext,
        operation: &mut Operation,
    ) -> Vec<(Option<u16>, Response)> {
        Self::operation_response(ctx, operation)
            .map(|res| (Some(200), res))
            .into_iter()
            .collect()
    }
}
