use aide::{
    axum::ApiRouter,
    openapi::{ApiKeyLocation, Components, Info, OpenApi, ReferenceOr, SecurityScheme, Server, Tag},
};
use axum_app_wrapper::AdHocPlugin;
use strum::{Display, EnumIter, EnumMessage, IntoEnumIterator, IntoStaticStr};

use crate::{
    auth::{API_KEY_HEADER, ApiKey},
    state::AppState,
};

mod build;
mod builds;
mod launch;

const SECURITY_SCHEME: &str = "ApiKey";

/// Tags in the OpenAPI specification
#[derive(Debug, IntoStaticStr, Display, EnumMessage, EnumIter)]
enum ApiTag {
    #[strum(message = "Build the application image and track builds")]
    Build,
    #[strum(message = "Launch containers from built images")]
    Launch,
}

fn routes() -> ApiRouter<AppState> {
    ApiRouter::new()
        .api_route("/image/build", build::route())
        .api_route("/image/launch", launch::route())
        .nest("/build", builds::routes())
}

/// OpenAPI document skeleton, completed with the routes when the router is finished
fn api_docs() -> OpenApi {
    let api_key_scheme = SecurityScheme::ApiKey {
        name: API_KEY_HEADER.to_owned(),
        location: ApiKeyLocation::Header,
        description: Some("API key set in the server configuration".to_owned()),
        extensions: Default::default(),
    };

    OpenApi {
        info: Info {
            title: env!("CARGO_PKG_NAME").to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            description: Some(env!("CARGO_PKG_DESCRIPTION").to_owned()),
            ..Default::default()
        },
        servers: vec![Server {
            url: "/api".to_owned(),
            ..Default::default()
        }],
        components: Some(Components {
            security_schemes: [(SECURITY_SCHEME.to_owned(), ReferenceOr::Item(api_key_scheme))]
                .into_iter()
                .collect(),
            ..Default::default()
        }),
        security: vec![[(SECURITY_SCHEME.to_owned(), Vec::new())].into_iter().collect()],
        tags: ApiTag::iter()
            .map(|tag| Tag {
                name: tag.to_string(),
                description: tag.get_message().map(str::to_owned),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

/// Adds all API routes to the server under `/api`, along with the OpenAPI document
/// at `/api/openapi.json` and Swagger UI at `/api/docs`
pub fn plugin() -> AdHocPlugin<AppState> {
    AdHocPlugin::<AppState>::new().on_setup(|router, state| {
        let api_router = routes().layer(axum::middleware::from_extractor_with_state::<ApiKey, _>(
            state.clone(),
        ));

        let mut openapi = api_docs();
        let router = router.nest("/api", api_router.finish_api(&mut openapi));

        let openapi_json = serde_json::to_string_pretty(&openapi)?;
        let openapi_route = axum::routing::get(|| async move { openapi_json });
        let swagger_route = aide::swagger::Swagger::new("/api/openapi.json").axum_route();
        let router = router
            .route("/api/openapi.json", openapi_route)
            .route("/api/docs", swagger_route.into());

        Ok(router)
    })
}
