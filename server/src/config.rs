use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
};

use anyhow::Context;
use axum_app_wrapper::AdHocPlugin;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AppConfig {
    /// API key that needs to be provided in the `X-Builder-Api-Key` header.
    pub api_key: String,
    /// Interval in seconds between cleanup runs for stopped containers and dangling images.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u32,
    /// Interval in seconds between checks that ready images still exist.
    #[serde(default = "default_sync_interval")]
    pub sync_interval: u32,
    /// Number of build records kept in memory. Finished builds are dropped oldest first.
    #[serde(default = "default_build_history")]
    pub build_history: usize,

    /// Directory every build context has to be inside of.
    #[serde(default = "default_context_root")]
    pub context_root: PathBuf,
    /// Build context used when a build doesn't specify one.
    #[serde(default = "default_context_dir")]
    pub context_dir: PathBuf,
    /// Base runtime image, including its version tag.
    #[serde(default = "default_base_image")]
    pub base_image: String,
    /// Command that upgrades the runtime's package installer.
    #[serde(default = "default_installer_upgrade")]
    pub installer_upgrade: String,
    /// Command that installs the manifest. The manifest path is appended.
    #[serde(default = "default_installer_install")]
    pub installer_install: String,
    /// Dependency manifest, relative to the build context.
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
    /// Working directory inside the image.
    #[serde(default = "default_workdir")]
    pub workdir: String,
    /// Runtime executable used by the entry command.
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Module executed by the entry command.
    #[serde(default = "default_entry_module")]
    pub entry_module: String,
    /// Tag applied to successful builds that don't specify one.
    #[serde(default = "default_image_tag")]
    pub image_tag: String,

    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}
fn default_cleanup_interval() -> u32 {
    300
}
fn default_sync_interval() -> u32 {
    60
}
fn default_build_history() -> usize {
    500
}
fn default_context_root() -> PathBuf {
    PathBuf::from("/srv")
}
fn default_context_dir() -> PathBuf {
    PathBuf::from("/srv/secondtry")
}
fn default_base_image() -> String {
    "python:3.11-slim".to_string()
}
fn default_installer_upgrade() -> String {
    "pip install --no-cache-dir --upgrade pip".to_string()
}
fn default_installer_install() -> String {
    "pip install --no-cache-dir -r".to_string()
}
fn default_manifest() -> PathBuf {
    PathBuf::from("requirements.txt")
}
fn default_workdir() -> String {
    "/app".to_string()
}
fn default_runtime() -> String {
    "python".to_string()
}
fn default_entry_module() -> String {
    "secondtry.cli".to_string()
}
fn default_image_tag() -> String {
    "secondtry:latest".to_string()
}
fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
fn default_port() -> u16 {
    8083
}
fn default_log_level() -> String {
    "warn".to_string()
}

/// Plugin that reads and validates configuration, and adds it to server state
pub fn plugin() -> AdHocPlugin<AppState> {
    AdHocPlugin::new().on_init(|mut state| async move {
        let config = extract_config()?;
        state.insert(config);
        Ok(state)
    })
}

/// Extract the configuration from env variables prefixed with `BUILDER_`.
pub fn extract_config() -> anyhow::Result<AppConfig> {
    let config = figment::Figment::new()
        .merge(figment::providers::Env::prefixed("BUILDER_"))
        .extract::<AppConfig>()
        .context("Failed to extract valid configuration")?;

    Ok(config)
}
