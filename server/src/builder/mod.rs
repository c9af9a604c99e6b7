//! Image builder, launcher and server plugin

use futures::Stream;
use secondtry_models::{BuildChunk, BuildInput, LaunchChunk, LaunchInput};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    builder::{
        constants::CHANNEL_BUFFER_SIZE,
        context::BuildContext,
        engine::ImageEngine,
        helpers::log,
        launcher::DockerLauncher,
        pipeline::{BuildJob, BuildPipeline},
        recipe::BuildRecipe,
    },
    config::AppConfig,
    errors::AppError,
};

mod constants;
mod context;
mod engine;
mod entry;
mod helpers;
mod launcher;
mod lifecycle;
mod manifest;
mod pipeline;
mod plugin;
mod recipe;
mod registry;
mod validators;

pub use plugin::plugin;
pub use registry::{BuildRecord, BuildRegistry};

/// # Image builder using Docker
///
/// Builds the application image from a build context in a fixed sequence of steps, and
/// launches containers from the built image. Each build and launch runs in its own task
/// and reports back through a stream of events.
pub struct DockerBuilder {
    client: bollard::Docker,
    config: AppConfig,
    template: liquid::Template,
    registry: BuildRegistry,
}

impl DockerBuilder {
    pub fn new(
        client: bollard::Docker,
        config: AppConfig,
        template: liquid::Template,
        registry: BuildRegistry,
    ) -> Self {
        Self {
            client,
            config,
            template,
            registry,
        }
    }

    pub fn registry(&self) -> &BuildRegistry {
        &self.registry
    }

    /// Build the application image and return a stream of events.
    /// Returns an error immediately if the recipe can't be resolved or rendered, or the
    /// Docker service was unreachable.
    pub async fn build(
        &self,
        input: BuildInput,
    ) -> Result<impl Stream<Item = BuildChunk> + use<>, AppError> {
        let recipe = BuildRecipe::resolve(&self.config, &input)?;
        let rendered = recipe.render(&self.template)?;
        let tag = input.tag.unwrap_or_else(|| self.config.image_tag.clone());
        validators::validate_tag(&tag).map_err(AppError::BadRequest)?;
        let context_dir = input
            .context_dir
            .unwrap_or_else(|| self.config.context_dir.clone());
        validators::validate_context_dir(&context_dir, &self.config.context_root)
            .map_err(AppError::BadRequest)?;

        // Ping the Docker service to ensure it is reachable
        self.client.ping().await?;

        // Spawn a task to build the image and send back events
        let (tx, rx) = mpsc::channel::<BuildChunk>(CHANNEL_BUFFER_SIZE);
        let client = self.client.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let build_id = Self::gen_id("build");
            let job = BuildJob {
                id: build_id.clone(),
                tag,
                recipe,
                rendered,
                context: BuildContext::new(context_dir),
            };

            tracing::info!("Starting build with ID '{build_id}'");
            let pipeline = BuildPipeline::new(&client, registry, tx);
            match pipeline.run_cancellable(job).await {
                Ok(built) => tracing::info!("Build '{build_id}' completed: {}", built.image_id),
                Err(err) => tracing::info!("Build '{build_id}' failed: {err}"),
            }
        });

        // Return the stream of events from the build
        Ok(ReceiverStream::new(rx))
    }

    /// Launch a container from a built image and return a stream of its events.
    /// The image can be given as a tag or as the ID of a successful build.
    pub async fn launch(
        &self,
        input: LaunchInput,
    ) -> Result<impl Stream<Item = LaunchChunk> + use<>, AppError> {
        let image = match self.registry.ready_image(&input.image).await {
            Some(image_id) => image_id,
            None => input.image.clone(),
        };
        validators::validate_image_reference(&image).map_err(AppError::BadRequest)?;

        // Ping the Docker service and ensure the image exists
        self.client.ping().await?;
        if !self.client.image_exists(&image).await? {
            return Err(AppError::NotFound);
        }

        // Spawn a task to run the container and send back events
        let (tx, rx) = mpsc::channel::<LaunchChunk>(CHANNEL_BUFFER_SIZE);
        let client = self.client.clone();
        tokio::spawn(async move {
            let launcher = DockerLauncher::new(client);
            let launch_id = Self::gen_id("launch");

            tracing::info!("Launching image '{image}' with ID '{launch_id}'");
            tokio::select! {
                res = launcher.run(&launch_id, &image, input, tx.clone()) => {
                    if let Err(err) = res {
                        log::send_error(&tx, err).await;
                    }
                    tracing::info!("Launch '{launch_id}' completed");
                }
                _ = tx.closed() => {
                    tracing::info!("Launch '{launch_id}' cancelled (connection dropped)");
                }
            }
            helpers::run_cleanup(&launcher.client, &launch_id).await;
        });

        Ok(ReceiverStream::new(rx))
    }

    fn gen_id(kind: &str) -> String {
        format!("secondtry-{kind}-{}", uuid::Uuid::new_v4())
    }
}
