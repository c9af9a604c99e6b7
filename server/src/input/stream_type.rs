use aide::OperationInput;
use axum::{extract::FromRequestParts, http::header::ACCEPT};

use crate::state::AppState;

/// Media types answered with JSON Lines
const JSONL_TYPES: [&str; 4] = [
    "application/jsonl",
    "application/json-lines",
    "application/x-ndjson",
    "application/json",
];

/// How build and launch events are streamed back, picked from the `Accept` header.
/// Server-Sent Events unless a JSON type is asked for first.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum StreamType {
    /// Server-Sent Events
    #[default]
    Sse,
    /// JSON Lines / Newline-delimited JSON
    Jsonl,
}

impl StreamType {
    /// Pick the stream type from an `Accept` header value, honouring the order of the
    /// listed media types and ignoring their parameters.
    fn from_accept(accept: &str) -> Self {
        accept
            .split(',')
            .filter_map(|media| media.split(';').next())
            .map(str::trim)
            .find_map(|media| match media {
                "text/event-stream" => Some(StreamType::Sse),
                m if JSONL_TYPES.contains(&m) => Some(StreamType::Jsonl),
                _ => None,
            })
            .unwrap_or_default()
    }
}

impl FromRequestParts<AppState> for StreamType {
    type Rejection = ();

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(parts
            .headers
            .get(ACCEPT)
            .and_then(|value| value.to_str().ok())
            .map(StreamType::from_accept)
            .unwrap_or_default())
    }
}

impl OperationInput for StreamType {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_sse() {
        assert_eq!(StreamType::from_accept("*/*"), StreamType::Sse);
        assert_eq!(StreamType::from_accept(""), StreamType::Sse);
        assert_eq!(StreamType::from_accept("text/event-stream"), StreamType::Sse);
    }

    #[test]
    fn json_types_select_jsonl() {
        assert_eq!(StreamType::from_accept("application/x-ndjson"), StreamType::Jsonl);
        assert_eq!(
            StreamType::from_accept("application/json; charset=utf-8, */*"),
            StreamType::Jsonl
        );
    }

    #[test]
    fn first_known_type_wins() {
        assert_eq!(
            StreamType::from_accept("text/event-stream, application/jsonl"),
            StreamType::Sse
        );
        assert_eq!(
            StreamType::from_accept("text/html, application/jsonl, text/event-stream"),
            StreamType::Jsonl
        );
    }
}
