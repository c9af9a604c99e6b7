use aide::{OperationInput, openapi};
use axum::{Json, RequestExt, extract::FromRequest};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::input::InputValidationError;

/// JSON body extractor that also runs the body's `validator` rules
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate + 'static,
{
    type Rejection = InputValidationError;

    async fn from_request(
        req: axum::extract::Request,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Json(value) = req
            .extract::<Json<T>, _>()
            .await
            .map_err(|err| InputValidationError::parse(err.body_text()))?;
        value
            .validate()
            .map_err(|errors| InputValidationError::invalid(&errors))?;

        Ok(Self(value))
    }
}

impl<T> OperationInput for AppJson<T>
where
    T: JsonSchema,
{
    fn operation_input(ctx: &mut aide::generate::GenContext, operation: &mut openapi::Operation) {
        Json::<T>::operation_input(ctx, operation);
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use secondtry_models::{BuildInput, LaunchInput};

    use super::*;

    fn json_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn accepts_valid_body() {
        let req = json_request(r#"{"image": "secondtry:latest", "timeout": 30}"#);
        let AppJson(input) = AppJson::<LaunchInput>::from_request(req, &()).await.unwrap();
        assert_eq!(input.image, "secondtry:latest");
        assert_eq!(input.timeout, Some(30));
        assert!(input.command.is_none());
    }

    #[tokio::test]
    async fn reports_invalid_fields() {
        let req = json_request(r#"{"context_dir": "relative/dir", "manifest": "../requirements.txt"}"#);
        let Err(err) = AppJson::<BuildInput>::from_request(req, &()).await else {
            panic!("expected validation error");
        };
        assert_eq!(err.fields, ["context_dir", "manifest"]);
    }

    #[tokio::test]
    async fn reports_malformed_json() {
        let req = json_request("{not json");
        let Err(err) = AppJson::<BuildInput>::from_request(req, &()).await else {
            panic!("expected parse error");
        };
        assert!(err.fields.is_empty());
        assert!(!err.message.is_empty());
    }
}
