//! Shared models for the secondtry image builder API

use std::path::{Component, Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use validator::{Validate, ValidationError};

/// Stages of a single image build, in the order they are reached.
///
/// A build only ever moves forward through these stages. When a step fails, the
/// build stops at the last stage it reached and the image is never tagged.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRefStr,
    Display,
    EnumString,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BuildStage {
    #[default]
    Unbuilt,
    BaseSelected,
    ToolchainUpdated,
    DependenciesInstalled,
    SourceCopied,
    ImageReady,
}

impl BuildStage {
    /// All stages in lifecycle order
    pub const ALL: [BuildStage; 6] = [
        BuildStage::Unbuilt,
        BuildStage::BaseSelected,
        BuildStage::ToolchainUpdated,
        BuildStage::DependenciesInstalled,
        BuildStage::SourceCopied,
        BuildStage::ImageReady,
    ];

    /// The stage that follows this one, or `None` for the terminal stage.
    pub fn next(self) -> Option<BuildStage> {
        let idx = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    pub fn is_terminal(self) -> bool {
        self == BuildStage::ImageReady
    }
}

/// Classification of a failed build. Every kind is fatal to the build attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BuildErrorKind {
    /// The dependency manifest was absent or unreadable
    ManifestMissing,
    /// The base runtime image could not be resolved or pulled
    BaseImage,
    /// Upgrading the package installer failed
    InstallerUpgrade,
    /// A dependency could not be resolved or installed
    Dependencies,
    /// The build context could not be read or copied
    SourceCopy,
    /// The image recipe could not be produced
    Recipe,
    /// The container engine failed outside of a build step
    Engine,
}

/// States of a process launched from a built image
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProcessState {
    Started,
    Running,
    /// The entry point completed with exit code 0
    Exited,
    /// The entry point failed, was killed, or timed out
    Crashed,
}

/// Options for building the image. Every field is optional and falls back to
/// the server configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct BuildInput {
    /// Directory on the server used as the build context
    #[validate(custom(function = "validate_absolute_dir"))]
    pub context_dir: Option<PathBuf>,
    /// Base runtime image, including its version tag (e.g. `python:3.11-slim`)
    #[validate(length(min = 1, max = 255))]
    pub base_image: Option<String>,
    /// Path of the dependency manifest, relative to the build context
    #[validate(custom(function = "validate_relative_path"))]
    pub manifest: Option<PathBuf>,
    /// Module executed as the entry point of the image
    #[validate(length(min = 1, max = 255))]
    pub entry_module: Option<String>,
    /// Tag applied to the image when the build succeeds
    #[validate(length(min = 1, max = 128))]
    pub tag: Option<String>,
}

/// Options for launching a container from a built image
#[derive(Debug, Default, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct LaunchInput {
    /// Image tag, or the ID of a successful build
    #[validate(length(min = 1, max = 255))]
    pub image: String,
    /// Replaces the image's default entry command
    #[validate(length(min = 1))]
    pub command: Option<Vec<String>>,
    /// Environment variables for the process, as `KEY=value`
    #[validate(custom(function = "validate_env"))]
    pub env: Option<Vec<String>>,
    /// Maximum run time in seconds. Runs until the process exits if not set.
    #[validate(range(min = 1))]
    pub timeout: Option<u32>,
}

fn validate_relative_path(path: &PathBuf) -> Result<(), ValidationError> {
    if path.is_absolute() {
        Err(ValidationError::new("absolute_path").with_message("path must be relative".into()))
    } else if path.components().any(|c| c == Component::ParentDir) {
        Err(ValidationError::new("invalid_path").with_message("path must not contain '..'".into()))
    } else if path.as_os_str().is_empty() || path == Path::new(".") {
        Err(ValidationError::new("empty_path").with_message("path must name a file".into()))
    } else {
        Ok(())
    }
}

fn validate_absolute_dir(path: &PathBuf) -> Result<(), ValidationError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ValidationError::new("relative_path")
            .with_message("build context must be an absolute path".into()))
    }
}

fn validate_env(env: &Vec<String>) -> Result<(), ValidationError> {
    for var in env {
        match var.split_once('=') {
            Some((key, _)) if !key.is_empty() => {}
            _ => {
                return Err(ValidationError::new("invalid_env")
                    .with_message("environment variables must be KEY=value".into()));
            }
        }
    }
    Ok(())
}

/// Chunk of the build stream output
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum BuildChunk {
    /// # Info
    /// Streamed info logs
    Info(String),
    /// # Debug
    /// Streamed build output
    Debug(String),
    /// # Warning
    /// Something that does not fail the build but will likely fail the launch
    Warning(String),
    /// # Stage
    /// The build reached a new lifecycle stage
    Stage { build_id: String, stage: BuildStage },
    /// # Error
    /// An issue outside of the build steps. This should be the final chunk of the stream.
    Error(String),
    /// # Build error
    /// A build step failed. This should be the final chunk of the stream.
    BuildError {
        build_id: String,
        stage: BuildStage,
        kind: BuildErrorKind,
        message: String,
        build_logs: String,
    },
    /// # Ready
    /// The image was built and tagged. This should be the final chunk of the stream.
    Ready {
        build_id: String,
        tag: String,
        image_id: String,
        entry_command: Vec<String>,
        manifest_digest: String,
        context_digest: String,
    },
}

/// Chunk of the launch stream output
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum LaunchChunk {
    /// # Info
    Info(String),
    /// # Debug
    Debug(String),
    /// # State
    /// The launched process changed state
    State(ProcessState),
    /// # Stdout
    /// Streamed stdout log from the container
    Stdout(String),
    /// # Stderr
    /// Streamed stderr log from the container
    Stderr(String),
    /// # Error
    /// The process could not be launched. This should be the final chunk of the stream.
    Error(String),
    /// # Exit
    /// The process ended. This should be the final chunk of the stream.
    Exit {
        state: ProcessState,
        exit_code: Option<i64>,
        timed_out: bool,
    },
}
