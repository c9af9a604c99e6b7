use bollard::models::CreateImageInfo;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::builder::{
    engine::ImageEngine,
    helpers::log::{self, LogChunk},
};

/// Pull the given image if it doesn't exist and stream logs to the client.
pub async fn pull_image<C: LogChunk>(
    engine: &impl ImageEngine,
    image: &str,
    tx: &mpsc::Sender<C>,
) -> Result<(), String> {
    match engine.image_exists(image).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            log::send_info(tx, format!("Pulling base image '{image}'...")).await;
            process_pull_stream(engine.pull_image(image), tx).await
        }
        Err(err) => Err(format!("could not inspect image '{image}': {err}")),
    }
}

/// Process the pull_image output from Docker and send logs to the client. Errors
/// reported inside the stream fail the pull.
async fn process_pull_stream<C: LogChunk>(
    mut pull_stream: impl Stream<Item = Result<CreateImageInfo, bollard::errors::Error>> + Unpin,
    tx: &mpsc::Sender<C>,
) -> Result<(), String> {
    while let Some(result) = pull_stream.next().await {
        match result {
            Ok(mut info) => {
                let status = info.status.unwrap_or_default();
                let progress_detail = info.progress_detail.take().unwrap_or_default();
                if let Some((current, total)) = progress_detail.current.zip(progress_detail.total) {
                    log::send_debug(tx, format!("Pulling image: {status} {current}/{total}")).await;
                }
                if let Some(message) = info.error_detail.and_then(|e| e.message) {
                    return Err(format!("error while pulling image: {message}"));
                }
            }
            Err(err) => return Err(format!("error while pulling image: {err}")),
        }
    }

    Ok(())
}
