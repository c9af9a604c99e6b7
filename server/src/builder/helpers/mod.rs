mod attach;
mod build;
mod cleanup;
mod create;
mod exit;
pub mod log;
mod pull;
mod sync;

pub use attach::{CapturedOutput, output_task};
pub use build::create_build_context;
pub use cleanup::{image_cleanup_task, run_cleanup};
pub use create::setup_container;
pub use exit::{ExitStatus, process_exit_status};
pub use pull::pull_image;
pub use sync::sync_build_status_task;
