use std::time::Duration;

use anyhow::Context;
use axum_app_wrapper::AdHocPlugin;
use bollard::Docker;

use crate::{
    builder::{
        DockerBuilder,
        helpers::{image_cleanup_task, sync_build_status_task},
        registry::BuildRegistry,
    },
    config::AppConfig,
    state::AppState,
};

/// Static directory containing the image recipe template
static DOCKER_STATIC_DIR: include_dir::Dir<'_> =
    include_dir::include_dir!("$CARGO_MANIFEST_DIR/docker");

/// Name of the recipe template in the static directory
const RECIPE_TEMPLATE: &str = "Dockerfile.liquid";

/// Server plugin that runs on startup to connect to Docker, parse the recipe template,
/// start the background tasks, and add the image builder to Axum state
pub fn plugin() -> AdHocPlugin<AppState> {
    AdHocPlugin::new().on_init(|mut state| async move {
        let app_config = state
            .get::<AppConfig>()
            .cloned()
            .context("config must be registered before the builder")?;

        // Connect to Docker and initialize client
        let client = tokio::task::spawn_blocking(Docker::connect_with_local_defaults)
            .await?
            .context("could not connect to Docker")?;

        let template = load_recipe_template()?;
        let registry = BuildRegistry::with_history(app_config.build_history);

        // Start background tasks
        let cleanup_period = Duration::from_secs(app_config.cleanup_interval.into());
        tokio::spawn(image_cleanup_task(client.clone(), cleanup_period));
        let sync_period = Duration::from_secs(app_config.sync_interval.into());
        tokio::spawn(sync_build_status_task(client.clone(), registry.clone(), sync_period));

        // Add builder to state
        let builder = DockerBuilder::new(client, app_config, template, registry);
        state.insert(builder);

        Ok(state)
    })
}

/// Parse the image recipe template
pub(crate) fn load_recipe_template() -> anyhow::Result<liquid::Template> {
    let file = DOCKER_STATIC_DIR
        .get_file(RECIPE_TEMPLATE)
        .and_then(|file| file.contents_utf8())
        .ok_or_else(|| anyhow::anyhow!("recipe template not found: '{RECIPE_TEMPLATE}'"))?;
    let parser = liquid::ParserBuilder::with_stdlib().build()?;
    parser
        .parse(file)
        .with_context(|| format!("recipe template parsing failed: '{RECIPE_TEMPLATE}'"))
}
