//! Logging utilities

use secondtry_models::{BuildChunk, LaunchChunk};
use tokio::sync::mpsc;

/// Stream chunks that can carry plain log messages
pub trait LogChunk: Send + 'static {
    fn info(message: String) -> Self;
    fn debug(message: String) -> Self;
    fn error(message: String) -> Self;
}

impl LogChunk for BuildChunk {
    fn info(message: String) -> Self {
        BuildChunk::Info(message)
    }
    fn debug(message: String) -> Self {
        BuildChunk::Debug(message)
    }
    fn error(message: String) -> Self {
        BuildChunk::Error(message)
    }
}

impl LogChunk for LaunchChunk {
    fn info(message: String) -> Self {
        LaunchChunk::Info(message)
    }
    fn debug(message: String) -> Self {
        LaunchChunk::Debug(message)
    }
    fn error(message: String) -> Self {
        LaunchChunk::Error(message)
    }
}

pub async fn send_info<C: LogChunk>(tx: &mpsc::Sender<C>, message: String) {
    let _ = tx.send(C::info(message)).await;
}
pub async fn send_debug<C: LogChunk>(tx: &mpsc::Sender<C>, message: String) {
    let _ = tx.send(C::debug(message)).await;
}
pub async fn send_error<C: LogChunk>(tx: &mpsc::Sender<C>, message: String) {
    tracing::debug!("Sending error to client: {message}");
    let _ = tx.send(C::error(message)).await;
}
