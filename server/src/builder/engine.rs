//! Container engine seam used by the build pipeline

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::{
    Docker,
    models::{BuildInfo, CreateImageInfo},
    query_parameters::{BuildImageOptionsBuilder, CreateImageOptionsBuilder},
};
use futures::{StreamExt, stream::BoxStream};
use tokio_util::io::ReaderStream;

/// A request to build and tag an image from a tar archive
pub struct ImageBuildRequest {
    pub tag: String,
    /// Name of the recipe file inside the archive
    pub recipe_file: String,
    pub labels: HashMap<String, String>,
    pub context: ReaderStream<tokio::io::DuplexStream>,
}

/// Operations the build pipeline needs from a container engine
#[async_trait]
pub trait ImageEngine: Send + Sync {
    /// Check if an image exists locally
    async fn image_exists(&self, image: &str) -> Result<bool, bollard::errors::Error>;

    /// Pull an image, streaming progress
    fn pull_image(
        &self,
        image: &str,
    ) -> BoxStream<'static, Result<CreateImageInfo, bollard::errors::Error>>;

    /// Build an image, streaming build output. The tag is only applied if every
    /// step succeeds.
    fn build_image(
        &self,
        request: ImageBuildRequest,
    ) -> BoxStream<'_, Result<BuildInfo, bollard::errors::Error>>;
}

#[async_trait]
impl ImageEngine for Docker {
    async fn image_exists(&self, image: &str) -> Result<bool, bollard::errors::Error> {
        match self.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn pull_image(
        &self,
        image: &str,
    ) -> BoxStream<'static, Result<CreateImageInfo, bollard::errors::Error>> {
        let options = CreateImageOptionsBuilder::new().from_image(image).build();
        self.create_image(Some(options), None, None).boxed()
    }

    fn build_image(
        &self,
        request: ImageBuildRequest,
    ) -> BoxStream<'_, Result<BuildInfo, bollard::errors::Error>> {
        let ImageBuildRequest {
            tag,
            recipe_file,
            labels,
            context,
        } = request;
        let options = BuildImageOptionsBuilder::new()
            .t(&tag)
            .dockerfile(&recipe_file)
            .labels(&labels)
            .rm(true)
            .forcerm(true)
            .build();
        Docker::build_image(self, options, None, Some(bollard::body_try_stream(context))).boxed()
    }
}
