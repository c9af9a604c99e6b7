use std::time::Duration;

use bollard::{Docker, query_parameters::ListImagesOptionsBuilder};
use chrono::Utc;

use crate::builder::{constants::BUILD_LABEL, registry::BuildRegistry};

/// Task to check that the images of ready builds still exist
pub async fn sync_build_status_task(docker: Docker, registry: BuildRegistry, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;

        let list_image_opt = ListImagesOptionsBuilder::new()
            .filters(&[("label", vec![BUILD_LABEL])].into())
            .build();
        let listed_at = Utc::now();
        let build_images = match docker.list_images(Some(list_image_opt)).await {
            Ok(images) => images,
            Err(err) => {
                tracing::warn!("Failed to list build images in Docker: {err}");
                continue;
            }
        };
        let image_ids: Vec<String> = build_images.into_iter().map(|image| image.id).collect();

        for removed in registry.mark_removed(&image_ids, listed_at).await {
            tracing::info!("Image of build '{removed}' no longer exists");
        }
    }
}
