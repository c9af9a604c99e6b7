use std::{collections::HashMap, time::Duration};

use bollard::{
    Docker,
    query_parameters::{
        PruneContainersOptionsBuilder, PruneImagesOptionsBuilder, RemoveContainerOptionsBuilder,
    },
};

use crate::builder::constants::{APP_LABEL, BUILD_LABEL};

/// Stop and remove the container of a finished or cancelled launch.
pub async fn run_cleanup(docker: &Docker, launch_id: &str) {
    // Errors are expected here if the container never started or already stopped
    if let Err(err) = docker.stop_container(launch_id, None::<bollard::query_parameters::StopContainerOptions>).await {
        tracing::debug!("Could not stop container '{launch_id}': {err}");
    }

    let opt = RemoveContainerOptionsBuilder::new().force(true).build();
    if let Err(err) = docker.remove_container(launch_id, Some(opt)).await {
        tracing::info!("Could not remove container '{launch_id}': {err}");
    }
}

/// Resources removed by the periodic cleanup
#[derive(Debug, Clone, Copy)]
enum PruneTarget {
    /// Stopped launch containers
    Containers,
    /// Build images whose tag moved to a newer build, and layers of failed builds
    Images,
}

impl PruneTarget {
    fn filters(self, until: &str) -> Vec<(&'static str, Vec<&str>)> {
        match self {
            PruneTarget::Containers => vec![("label", vec![APP_LABEL]), ("until", vec![until])],
            PruneTarget::Images => vec![
                ("label", vec![BUILD_LABEL]),
                ("until", vec![until]),
                ("dangling", vec!["true"]),
            ],
        }
    }
}

/// Task to periodically prune what launches and builds leave behind. Only resources
/// older than one period are touched, so running launches and builds are left alone.
pub async fn image_cleanup_task(docker: Docker, period: Duration) {
    let mut interval = tokio::time::interval(period);
    let until = format!("{}s", period.as_secs());
    loop {
        interval.tick().await;
        for target in [PruneTarget::Containers, PruneTarget::Images] {
            prune(&docker, target, &until).await;
        }
    }
}

async fn prune(docker: &Docker, target: PruneTarget, until: &str) {
    let filters: HashMap<_, _> = target.filters(until).into_iter().collect();
    let (removed, reclaimed) = match target {
        PruneTarget::Containers => {
            let opt = PruneContainersOptionsBuilder::new().filters(&filters).build();
            match docker.prune_containers(Some(opt)).await {
                Ok(res) => (
                    res.containers_deleted.map_or(0, |c| c.len()),
                    res.space_reclaimed,
                ),
                Err(err) => {
                    tracing::warn!("Failed to prune containers: {err}");
                    return;
                }
            }
        }
        PruneTarget::Images => {
            let opt = PruneImagesOptionsBuilder::new().filters(&filters).build();
            match docker.prune_images(Some(opt)).await {
                Ok(res) => (res.images_deleted.map_or(0, |i| i.len()), res.space_reclaimed),
                Err(err) => {
                    tracing::warn!("Failed to prune images: {err}");
                    return;
                }
            }
        }
    };
    if removed > 0 {
        let mb = reclaimed.unwrap_or_default() as f64 / 1024.0 / 1024.0;
        tracing::info!("Pruned {removed} {target:?}, reclaimed {mb:.2} MB");
    }
}
