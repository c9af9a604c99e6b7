//! Launcher for running a built image in a Docker container

use std::time::Duration;

use bollard::{Docker, query_parameters::AttachContainerOptionsBuilder};
use futures::StreamExt;
use secondtry_models::{LaunchChunk, LaunchInput, ProcessState};
use tokio::sync::mpsc;

use crate::builder::helpers::{self, ExitStatus, log};

pub struct DockerLauncher {
    pub client: Docker,
}

impl DockerLauncher {
    pub fn new(client: Docker) -> Self {
        Self { client }
    }

    /// Create and start a container from `image`, forwarding its output until the process
    /// ends. The container is named after the launch ID, and is left for the caller to
    /// clean up.
    pub async fn run(
        &self,
        launch_id: &str,
        image: &str,
        input: LaunchInput,
        tx: mpsc::Sender<LaunchChunk>,
    ) -> Result<ExitStatus, String> {
        let LaunchInput {
            command,
            env,
            timeout,
            ..
        } = input;

        // Create the container
        let (body, options) = helpers::setup_container(launch_id, image, command, env);
        self.client
            .create_container(Some(options), body)
            .await
            .map_err(|err| format!("Failed to create container '{launch_id}': {err}"))?;
        let _ = tx.send(LaunchChunk::State(ProcessState::Started)).await;

        // Attach to container and forward its output
        let attach_options = AttachContainerOptionsBuilder::new()
            .stream(true)
            .stdout(true)
            .stderr(true)
            .logs(true)
            .build();
        let attached = self
            .client
            .attach_container(launch_id, Some(attach_options))
            .await
            .map_err(|err| format!("Failed to attach to container: {err}"))?;
        let output_task = tokio::spawn(helpers::output_task(attached.output, tx.clone()));

        // Start container
        log::send_info(&tx, format!("Starting container from image '{image}'...")).await;
        self.client
            .start_container(launch_id, None::<bollard::query_parameters::StartContainerOptions>)
            .await
            .map_err(|err| format!("Failed to start container '{launch_id}': {err}"))?;
        tracing::info!("Launch '{launch_id}' running image '{image}'");
        let _ = tx.send(LaunchChunk::State(ProcessState::Running)).await;

        // Wait for the process to exit, stopping it if it outlives the timeout
        let mut wait_stream = self.client.wait_container(launch_id, None::<bollard::query_parameters::WaitContainerOptions>);
        let exit_result = match timeout {
            Some(secs) => {
                tokio::time::timeout(Duration::from_secs(secs.into()), wait_stream.next()).await
            }
            None => Ok(wait_stream.next().await),
        };
        if exit_result.is_err() {
            let secs = timeout.unwrap_or_default();
            log::send_info(&tx, format!("Process timed out after {secs}s, stopping...")).await;
            let _ = self.client.stop_container(launch_id, None::<bollard::query_parameters::StopContainerOptions>).await;
        }
        let captured = output_task.await.unwrap_or_default();

        let status = helpers::process_exit_status(exit_result);
        tracing::info!(
            "Launch '{launch_id}' ended as '{}' (exit code {:?}, {} bytes of stderr)",
            status.state,
            status.exit_code,
            captured.stderr.len()
        );
        let _ = tx
            .send(LaunchChunk::Exit {
                state: status.state,
                exit_code: status.exit_code,
                timed_out: status.timed_out,
            })
            .await;

        Ok(status)
    }
}
