use axum_app_wrapper::App;

mod api;
mod auth;
mod builder;
mod config;
mod errors;
mod input;
mod responses;
mod state;

pub use config::{AppConfig, extract_config};

pub async fn create_app() -> anyhow::Result<(axum::Router, AppConfig, impl Future + Send)> {
    let (router, state, on_shutdown) = App::new()
        .register(config::plugin()) // Extract configuration and add to state
        .register(builder::plugin()) // Connect to Docker and add the image builder
        .register(api::plugin()) // Add API routes
        .init()
        .await?;
    let app_config = state.config.to_owned();

    Ok((router.with_state(state), app_config, on_shutdown))
}
