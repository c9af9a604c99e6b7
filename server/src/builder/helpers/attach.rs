use bollard::container::LogOutput;
use futures::{Stream, StreamExt};
use secondtry_models::LaunchChunk;
use tokio::sync::mpsc;

use crate::builder::helpers::log;

/// Maximum number of bytes accumulated for stdout or stderr.
/// Output beyond this limit is still streamed, but no longer kept.
const MAX_OUTPUT_BYTES: usize = 1024 * 1024; // 1 MB

/// Output kept from a launched process
#[derive(Debug, Default)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Forward the container's stdout/stderr to the client until the output stream ends,
/// returning the accumulated output.
pub async fn output_task(
    mut output_stream: impl Stream<Item = Result<LogOutput, bollard::errors::Error>> + Unpin,
    tx: mpsc::Sender<LaunchChunk>,
) -> CapturedOutput {
    let mut captured = CapturedOutput::default();
    while let Some(output_result) = output_stream.next().await {
        match output_result {
            Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                let message_str = String::from_utf8_lossy(&message).into_owned();
                if captured.stdout.len() < MAX_OUTPUT_BYTES {
                    captured.stdout.push_str(&message_str);
                }
                tx.send(LaunchChunk::Stdout(message_str)).await.ok();
            }
            Ok(LogOutput::StdErr { message }) => {
                let message_str = String::from_utf8_lossy(&message).into_owned();
                if captured.stderr.len() < MAX_OUTPUT_BYTES {
                    captured.stderr.push_str(&message_str);
                }
                tx.send(LaunchChunk::Stderr(message_str)).await.ok();
            }
            Ok(_) => {}
            Err(e) => {
                let message = format!("Error while processing output: {e}");
                log::send_info(&tx, message).await;
            }
        }
    }

    captured
}
